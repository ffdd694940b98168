//! Operator bootstrap
//!
//! Runs the one-shot startup steps (driver config, StorageClass), registers
//! the driver controllers on a [`ControllerSet`] and keeps everything running
//! until shutdown.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::assets::AssetDir;
use crate::adapters::cluster::{KubeCluster, StartupCluster};
use crate::adapters::manifest::data_hash;
use crate::config::OperatorConfig;
use crate::controllers::apply_set::ApplyControllerSet;
use crate::controllers::{
    with_controller_service, with_node_service, Context, ControllerSet, LogLevelSetter,
};
use crate::informers::{build_informers, InformerFactory};
use crate::metrics;
use crate::reconcilers::driver_config::ensure_driver_config;
use crate::reconcilers::storage_class::{ensure_storage_class, Provisioning};
use crate::{Error, Result};

/// Manifests applied by the static resources controller, in order
pub const STATIC_ASSETS: &[&str] = &[
    "configmap.yaml",
    "csi-driver.yaml",
    "node-sa.yaml",
    "node-cr.yaml",
    "node-binding.yaml",
    "controller-sa.yaml",
    "controller-cr.yaml",
    "controller-binding.yaml",
    "leader-election-cr.yaml",
    "controller-leader-binding.yaml",
    "node-leader-binding.yaml",
];

pub const STATIC_RESOURCES_CONTROLLER: &str = "KubevirtDriverStaticResources";
pub const CREDENTIALS_REQUEST_CONTROLLER: &str = "KubevirtDriverCredentialsRequestController";
pub const CSI_DRIVER_CONTROLLER: &str = "KubevirtDriverController";

pub const CREDENTIALS_REQUEST_ASSET: &str = "credentials-request.yaml";
pub const CONTROLLER_SERVICE_ASSET: &str = "controller.yaml";
pub const NODE_SERVICE_ASSET: &str = "node.yaml";

/// How long the controller set gets to wind down after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Result of the startup steps
#[derive(Debug, Clone)]
pub struct Startup {
    pub driver_config: ConfigMap,
    pub storage_class: Provisioning,
}

/// Derive the driver config asset, then make sure the StorageClass exists
pub async fn prepare(
    cluster: &dyn StartupCluster,
    config: &OperatorConfig,
    assets: &AssetDir,
) -> Result<Startup> {
    let driver_config = ensure_driver_config(cluster, config, assets).await?;
    let storage_class = ensure_storage_class(cluster, config).await?;

    Ok(Startup {
        driver_config,
        storage_class,
    })
}

/// Register the KubeVirt CSI driver controllers
pub fn configure_controller_set<C: ControllerSet>(controller_set: &mut C, config: &OperatorConfig) {
    controller_set
        .with_log_level_controller()
        .with_management_state_controller(&config.operand_name, false)
        .with_static_resources_controller(STATIC_RESOURCES_CONTROLLER, STATIC_ASSETS)
        .with_credentials_request_controller(
            CREDENTIALS_REQUEST_CONTROLLER,
            &config.operator_namespace,
            CREDENTIALS_REQUEST_ASSET,
        )
        .with_csi_driver_controller(
            CSI_DRIVER_CONTROLLER,
            &config.instance_name,
            &config.operand_name,
            &config.operator_namespace,
            vec![
                with_controller_service(CONTROLLER_SERVICE_ASSET),
                with_node_service(NODE_SERVICE_ASSET),
            ],
        );
}

/// Start the informers and the controller set, then wait for shutdown
///
/// Always ends with [`Error::Stopped`] once `shutdown` is cancelled.
pub async fn start_and_wait<C: ControllerSet>(
    controller_set: C,
    informers: Vec<InformerFactory>,
    workers: usize,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("Starting the informers");
    for factory in informers {
        factory.start(shutdown.clone());
    }

    info!("Starting controllerset");
    let controllers = tokio::spawn(controller_set.run(shutdown.clone(), workers));

    shutdown.cancelled().await;

    match tokio::time::timeout(SHUTDOWN_GRACE, controllers).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!("Controller set exited with error: {}", e),
        Ok(Err(e)) => warn!("Controller set task failed: {}", e),
        Err(_) => warn!("Controller set did not stop within {:?}", SHUTDOWN_GRACE),
    }

    Err(Error::Stopped)
}

/// Run the operator against the cluster until `shutdown` is cancelled
pub async fn run_operator(
    client: Client,
    config: OperatorConfig,
    log_level: Option<LogLevelSetter>,
    shutdown: CancellationToken,
) -> Result<()> {
    let assets = AssetDir::new(&config.assets_dir);
    let cluster = KubeCluster::new(client.clone());

    let (stores, namespaced, cluster_wide) =
        build_informers(&client, &config.operator_namespace, &config.instance_name);

    let startup = prepare(&cluster, &config, &assets).await?;
    info!("Startup complete, storage class: {:?}", startup.storage_class);

    let empty = BTreeMap::new();
    let driver_config_hash = data_hash(startup.driver_config.data.as_ref().unwrap_or(&empty));

    let workers = config.workers;
    let ctx = Context::new(
        client,
        config.clone(),
        assets,
        stores,
        driver_config_hash,
        log_level,
    );

    let mut controller_set = ApplyControllerSet::new(ctx);
    configure_controller_set(&mut controller_set, &config);

    metrics::set_ready(true);

    start_and_wait(
        controller_set,
        vec![namespaced, cluster_wide],
        workers,
        shutdown,
    )
    .await
}
