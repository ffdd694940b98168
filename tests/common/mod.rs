//! Shared fakes for the integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kubevirt_csi_driver_operator::adapters::cluster::StartupCluster;
use kubevirt_csi_driver_operator::{Error, Result};

/// In-memory cluster that records every call made against it
#[derive(Default)]
pub struct FakeCluster {
    config_maps: HashMap<(String, String), ConfigMap>,
    storage_classes: Mutex<Vec<StorageClass>>,
    machine_sets: Vec<DynamicObject>,
    fail_storage_class_lookup: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_map(mut self, namespace: &str, name: &str, data: &[(&str, &str)]) -> Self {
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        };
        self.config_maps
            .insert((namespace.to_string(), name.to_string()), config_map);
        self
    }

    pub fn with_cloud_config(self, json: &str) -> Self {
        self.with_config_map("openshift-config", "cloud-provider-config", &[("config", json)])
    }

    pub fn with_install_config(self, document: &str) -> Self {
        self.with_config_map("kube-system", "cluster-config-v1", &[("install-config", document)])
    }

    pub fn with_storage_class(self, name: &str) -> Self {
        self.storage_classes.lock().unwrap().push(StorageClass {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            provisioner: "csi.kubevirt.io".to_string(),
            ..Default::default()
        });
        self
    }

    pub fn with_machine_set(mut self, name: &str, storage_class: Option<&str>) -> Self {
        let mut provider_value = serde_json::json!({});
        if let Some(sc) = storage_class {
            provider_value["storageClassName"] = serde_json::Value::String(sc.to_string());
        }
        let machine_set: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "machine.openshift.io/v1beta1",
            "kind": "MachineSet",
            "metadata": { "name": name, "namespace": "openshift-machine-api" },
            "spec": { "template": { "spec": { "providerSpec": { "value": provider_value } } } }
        }))
        .unwrap();
        self.machine_sets.push(machine_set);
        self
    }

    pub fn failing_storage_class_lookup(mut self) -> Self {
        self.fail_storage_class_lookup = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }

    pub fn storage_classes(&self) -> Vec<StorageClass> {
        self.storage_classes.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl StartupCluster for FakeCluster {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        self.record(format!("get_config_map {}/{}", namespace, name));
        Ok(self
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_storage_class(&self, name: &str) -> Result<Option<StorageClass>> {
        self.record(format!("get_storage_class {}", name));
        if self.fail_storage_class_lookup {
            return Err(Error::KubeError("forbidden".to_string()));
        }
        Ok(self
            .storage_classes
            .lock()
            .unwrap()
            .iter()
            .find(|sc| sc.metadata.name.as_deref() == Some(name))
            .cloned())
    }

    async fn list_machine_sets(&self, namespace: &str) -> Result<Vec<DynamicObject>> {
        self.record(format!("list_machine_sets {}", namespace));
        Ok(self.machine_sets.clone())
    }

    async fn create_storage_class(&self, storage_class: &StorageClass) -> Result<StorageClass> {
        self.record(format!(
            "create_storage_class {}",
            storage_class.metadata.name.clone().unwrap_or_default()
        ));
        self.storage_classes
            .lock()
            .unwrap()
            .push(storage_class.clone());
        Ok(storage_class.clone())
    }
}
