//! Cluster reads and writes needed during startup

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{ApiResource, DynamicObject, ListParams, PostParams};
use kube::core::GroupVersionKind;
use kube::{Api, Client};

use crate::error::is_not_found;
use crate::{Error, Result};

/// API resource for OpenShift MachineSets
pub fn machine_set_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("machine.openshift.io", "v1beta1", "MachineSet"),
        "machinesets",
    )
}

/// API resource for the cluster-scoped ClusterCSIDriver operator config
pub fn cluster_csi_driver_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("operator.openshift.io", "v1", "ClusterCSIDriver"),
        "clustercsidrivers",
    )
}

/// Cluster operations used by the driver config and storage class steps
///
/// Lookups return `Ok(None)` for objects that do not exist; every other
/// API failure is an error.
#[async_trait]
pub trait StartupCluster: Send + Sync {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    async fn get_storage_class(&self, name: &str) -> Result<Option<StorageClass>>;

    async fn list_machine_sets(&self, namespace: &str) -> Result<Vec<DynamicObject>>;

    async fn create_storage_class(&self, storage_class: &StorageClass) -> Result<StorageClass>;
}

/// [`StartupCluster`] backed by the API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StartupCluster for KubeCluster {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        config_maps.get_opt(name).await.map_err(|e| {
            Error::KubeError(format!(
                "Failed to get ConfigMap {}/{}: {}",
                namespace, name, e
            ))
        })
    }

    async fn get_storage_class(&self, name: &str) -> Result<Option<StorageClass>> {
        let storage_classes: Api<StorageClass> = Api::all(self.client.clone());
        storage_classes
            .get_opt(name)
            .await
            .map_err(|e| Error::KubeError(format!("Failed to get StorageClass {}: {}", name, e)))
    }

    async fn list_machine_sets(&self, namespace: &str) -> Result<Vec<DynamicObject>> {
        let machine_sets: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &machine_set_resource());

        let listed = machine_sets
            .list(&ListParams::default())
            .await
            .map(|list| list.items);
        machine_sets_or_empty(listed, namespace)
    }

    async fn create_storage_class(&self, storage_class: &StorageClass) -> Result<StorageClass> {
        let storage_classes: Api<StorageClass> = Api::all(self.client.clone());
        storage_classes
            .create(&PostParams::default(), storage_class)
            .await
            .map_err(|e| Error::KubeError(format!("Failed to create StorageClass: {}", e)))
    }
}

/// MachineSet list result, with a missing machine API read as no MachineSets
pub fn machine_sets_or_empty(
    listed: std::result::Result<Vec<DynamicObject>, kube::Error>,
    namespace: &str,
) -> Result<Vec<DynamicObject>> {
    match listed {
        Ok(items) => Ok(items),
        Err(e) if is_not_found(&e) => Ok(Vec::new()),
        Err(e) => Err(Error::KubeError(format!(
            "Failed to list MachineSets in {}: {}",
            namespace, e
        ))),
    }
}
