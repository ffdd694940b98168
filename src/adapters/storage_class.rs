//! StorageClass builder and infra storage class lookups

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;

use crate::config::OperatorConfig;
use crate::{Error, Result};

/// StorageClass parameter naming the storage class on the infra cluster
pub const INFRA_STORAGE_CLASS_PARAM: &str = "infraStorageClassName";
/// Key in the installer ConfigMap holding the install-config document
pub const INSTALL_CONFIG_KEY: &str = "install-config";

/// Build the tenant StorageClass backed by the given infra storage class
pub fn build_storage_class(config: &OperatorConfig, infra_storage_class: &str) -> StorageClass {
    let mut parameters = BTreeMap::new();
    parameters.insert(
        INFRA_STORAGE_CLASS_PARAM.to_string(),
        infra_storage_class.to_string(),
    );

    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        config.operator_name.clone(),
    );

    StorageClass {
        metadata: ObjectMeta {
            name: Some(config.storage_class_name.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        provisioner: config.provisioner.clone(),
        parameters: Some(parameters),
        ..Default::default()
    }
}

/// Storage class named by the installer, if any
///
/// Returns `Ok(None)` when the ConfigMap carries no install-config or the
/// document does not set `platform.kubevirt.storageClass`. A document that
/// is not valid YAML is an error.
pub fn storage_class_from_install_config(install_config: &ConfigMap) -> Result<Option<String>> {
    let Some(document) = install_config
        .data
        .as_ref()
        .and_then(|data| data.get(INSTALL_CONFIG_KEY))
    else {
        return Ok(None);
    };

    let parsed: serde_yaml::Value = serde_yaml::from_str(document)
        .map_err(|e| Error::ParseError(format!("Invalid install-config document: {}", e)))?;

    Ok(parsed
        .get("platform")
        .and_then(|p| p.get("kubevirt"))
        .and_then(|k| k.get("storageClass"))
        .and_then(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

/// Storage class referenced by a MachineSet's KubeVirt provider spec
pub fn storage_class_from_machine_set(machine_set: &DynamicObject) -> Option<String> {
    machine_set
        .data
        .pointer("/spec/template/spec/providerSpec/value/storageClassName")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
