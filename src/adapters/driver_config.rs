//! Cloud provider config to driver ConfigMap transformation

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::config::OperatorConfig;
use crate::{Error, Result};

/// Key in the cloud provider ConfigMap holding the JSON document
pub const CLOUD_CONFIG_KEY: &str = "config";
/// Driver config key for the infra cluster namespace
pub const INFRA_CLUSTER_NAMESPACE_KEY: &str = "infraClusterNamespace";
/// Driver config key for the label selector of infra resources
pub const INFRA_CLUSTER_LABELS_KEY: &str = "infraClusterLabels";

/// Label selector matching infra resources owned by this tenant cluster
pub fn infra_cluster_labels(infra_id: &str) -> String {
    format!("tenantcluster-{}-machine.openshift.io=owned", infra_id)
}

/// Build the driver ConfigMap from the cloud provider ConfigMap
pub fn derive_driver_config(source: &ConfigMap, config: &OperatorConfig) -> Result<ConfigMap> {
    let source_ref = format!(
        "{}/{}",
        source.namespace().unwrap_or_default(),
        source.name_any()
    );

    let json_config = source
        .data
        .as_ref()
        .and_then(|data| data.get(CLOUD_CONFIG_KEY))
        .ok_or_else(|| {
            Error::ConfigError(format!(
                "Field {} in ConfigMap {} is missing",
                CLOUD_CONFIG_KEY, source_ref
            ))
        })?;

    let cloud_config: BTreeMap<String, String> =
        serde_json::from_str(json_config).map_err(|e| {
            Error::ParseError(format!(
                "Invalid JSON in field {} of ConfigMap {}: {}",
                CLOUD_CONFIG_KEY, source_ref, e
            ))
        })?;

    let namespace = required_key(&cloud_config, "namespace", &source_ref)?;
    let infra_id = required_key(&cloud_config, "infraID", &source_ref)?;

    let mut data = BTreeMap::new();
    data.insert(INFRA_CLUSTER_NAMESPACE_KEY.to_string(), namespace.to_string());
    data.insert(
        INFRA_CLUSTER_LABELS_KEY.to_string(),
        infra_cluster_labels(infra_id),
    );

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(config.driver_config_name.clone()),
            namespace: Some(config.operator_namespace.clone()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    })
}

fn required_key<'a>(
    cloud_config: &'a BTreeMap<String, String>,
    key: &str,
    source_ref: &str,
) -> Result<&'a str> {
    cloud_config.get(key).map(String::as_str).ok_or_else(|| {
        Error::ConfigError(format!(
            "Missing {} in JSON string. Check field {} in ConfigMap {}",
            key, CLOUD_CONFIG_KEY, source_ref
        ))
    })
}

/// Render the driver ConfigMap as a manifest
pub fn render_manifest(driver_config: &ConfigMap) -> Result<String> {
    serde_yaml::to_string(driver_config)
        .map_err(|e| Error::ParseError(format!("Failed to serialize driver config: {}", e)))
}
