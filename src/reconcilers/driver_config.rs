//! Startup step producing the driver ConfigMap asset

use k8s_openapi::api::core::v1::ConfigMap;
use tracing::info;

use crate::adapters::assets::AssetDir;
use crate::adapters::cluster::StartupCluster;
use crate::adapters::driver_config;
use crate::config::OperatorConfig;
use crate::{Error, Result};

/// Asset consumed by the static resources controller
pub const DRIVER_CONFIG_ASSET: &str = "configmap.yaml";

/// Read the cloud provider config and derive the driver ConfigMap
pub async fn create_driver_config(
    cluster: &dyn StartupCluster,
    config: &OperatorConfig,
) -> Result<ConfigMap> {
    let source = cluster
        .get_config_map(&config.cloud_config_namespace, &config.cloud_config_name)
        .await?
        .ok_or_else(|| {
            Error::ConfigError(format!(
                "ConfigMap {}/{} not found",
                config.cloud_config_namespace, config.cloud_config_name
            ))
        })?;

    driver_config::derive_driver_config(&source, config)
}

/// Derive the driver ConfigMap and write it to the asset directory
pub async fn ensure_driver_config(
    cluster: &dyn StartupCluster,
    config: &OperatorConfig,
    assets: &AssetDir,
) -> Result<ConfigMap> {
    let driver_config = create_driver_config(cluster, config).await?;
    let manifest = driver_config::render_manifest(&driver_config)?;

    assets.write(DRIVER_CONFIG_ASSET, &manifest).await?;

    info!(
        "Wrote driver config {}/{} to {}",
        config.operator_namespace,
        config.driver_config_name,
        assets.root().join(DRIVER_CONFIG_ASSET).display()
    );

    Ok(driver_config)
}
