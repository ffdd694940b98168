//! Controllers that keep the KubeVirt CSI driver installed
//!
//! [`ControllerSet`] is the seam between the bootstrapper and whatever runs
//! the controllers. [`apply_set::ApplyControllerSet`] is the built-in
//! implementation that server-side applies the bundled manifests.

pub mod apply_set;
pub mod credentials_request;
pub mod csi_driver;
pub mod operator_state;
pub mod static_resources;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::discovery::{self, ApiCapabilities, Scope};
use kube::runtime::reflector::ObjectRef;
use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adapters::assets::AssetDir;
use crate::adapters::cluster::cluster_csi_driver_resource;
use crate::adapters::manifest;
use crate::config::OperatorConfig;
use crate::informers::InformerStores;
use crate::{Error, Result};

/// Applies a tracing filter directive such as `info` or `debug`
pub type LogLevelSetter = Arc<dyn Fn(&str) -> Result<()> + Send + Sync>;

/// Static manifests applied as-is on every sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticResourcesController {
    pub name: String,
    /// Asset names, applied in order
    pub assets: Vec<String>,
}

/// CredentialsRequest whose secret lands in `target_namespace`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialsRequestController {
    pub name: String,
    pub target_namespace: String,
    pub asset: String,
}

/// Workload making up one half of the CSI driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverService {
    /// Controller plugin Deployment
    Controller(String),
    /// Node plugin DaemonSet
    Node(String),
}

impl DriverService {
    pub fn asset(&self) -> &str {
        match self {
            DriverService::Controller(asset) | DriverService::Node(asset) => asset,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DriverService::Controller(_) => "controller",
            DriverService::Node(_) => "node",
        }
    }
}

/// Builder option adding the controller plugin Deployment
pub fn with_controller_service(asset: &str) -> DriverService {
    DriverService::Controller(asset.to_string())
}

/// Builder option adding the node plugin DaemonSet
pub fn with_node_service(asset: &str) -> DriverService {
    DriverService::Node(asset.to_string())
}

/// Controller deploying the CSI driver workloads and reporting their status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsiDriverController {
    pub name: String,
    pub instance_name: String,
    pub operand_name: String,
    pub namespace: String,
    pub services: Vec<DriverService>,
}

/// Honors `spec.managementState` of the operator instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementStateController {
    pub operand_name: String,
    pub supports_removed: bool,
}

/// A set of controllers sharing one lifecycle
#[async_trait]
pub trait ControllerSet: Send + 'static {
    /// Follow `spec.operatorLogLevel` of the operator instance
    fn with_log_level_controller(&mut self) -> &mut Self;

    fn with_management_state_controller(
        &mut self,
        operand_name: &str,
        supports_removed: bool,
    ) -> &mut Self;

    fn with_static_resources_controller(&mut self, name: &str, assets: &[&str]) -> &mut Self;

    fn with_credentials_request_controller(
        &mut self,
        name: &str,
        target_namespace: &str,
        asset: &str,
    ) -> &mut Self;

    fn with_csi_driver_controller(
        &mut self,
        name: &str,
        instance_name: &str,
        operand_name: &str,
        namespace: &str,
        services: Vec<DriverService>,
    ) -> &mut Self;

    /// Run every registered controller until `shutdown` is cancelled
    async fn run(self, shutdown: CancellationToken, workers: usize) -> Result<()>;
}

/// Shared context for controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    pub config: OperatorConfig,
    pub assets: AssetDir,
    pub stores: InformerStores,
    /// Digest of the driver ConfigMap data, stamped on driver pods
    pub driver_config_hash: String,
    pub log_level: Option<LogLevelSetter>,
    resources: Mutex<HashMap<GroupVersionKind, (ApiResource, ApiCapabilities)>>,
}

impl Context {
    /// Create a new context
    pub fn new(
        client: Client,
        config: OperatorConfig,
        assets: AssetDir,
        stores: InformerStores,
        driver_config_hash: String,
        log_level: Option<LogLevelSetter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            config,
            assets,
            stores,
            driver_config_hash,
            log_level,
            resources: Mutex::new(HashMap::new()),
        })
    }

    /// The ClusterCSIDriver instance, as last seen by the informer
    pub fn operator_instance(&self) -> Option<Arc<DynamicObject>> {
        self.stores.cluster_csi_drivers.get(&ObjectRef::new_with(
            &self.config.instance_name,
            cluster_csi_driver_resource(),
        ))
    }

    /// Load and parse a manifest asset
    pub async fn manifest(&self, asset: &str) -> Result<DynamicObject> {
        let yaml = self.assets.read(asset).await?;
        manifest::parse_manifest(asset, &yaml)
    }

    /// Server-side apply an untyped object
    pub async fn apply(&self, object: &DynamicObject) -> Result<()> {
        let gvk = manifest::group_version_kind(object)?;
        let (resource, capabilities) = self.resolve(&gvk).await?;
        let name = object.name_any();

        let api: Api<DynamicObject> = match capabilities.scope {
            Scope::Namespaced => {
                let namespace = object
                    .namespace()
                    .unwrap_or_else(|| self.config.operator_namespace.clone());
                Api::namespaced_with(self.client.clone(), &namespace, &resource)
            }
            Scope::Cluster => Api::all_with(self.client.clone(), &resource),
        };

        api.patch(
            &name,
            &PatchParams::apply(&self.config.operator_name).force(),
            &Patch::Apply(object),
        )
        .await
        .map_err(|e| Error::KubeError(format!("Failed to apply {} {}: {}", gvk.kind, name, e)))?;

        debug!("Applied {} {}", gvk.kind, name);
        Ok(())
    }

    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, ApiCapabilities)> {
        if let Some(found) = self.cached_resource(gvk) {
            return Ok(found);
        }

        let found = discovery::pinned_kind(&self.client, gvk)
            .await
            .map_err(|e| Error::KubeError(format!("Failed to discover {:?}: {}", gvk, e)))?;

        if let Ok(mut resources) = self.resources.lock() {
            resources.insert(gvk.clone(), found.clone());
        }
        Ok(found)
    }

    fn cached_resource(&self, gvk: &GroupVersionKind) -> Option<(ApiResource, ApiCapabilities)> {
        self.resources
            .lock()
            .ok()
            .and_then(|resources| resources.get(gvk).cloned())
    }
}
