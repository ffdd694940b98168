//! Parsing and light patching of static manifests

use std::collections::BTreeMap;

use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::ResourceExt;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Parse a single-document YAML manifest into an untyped object
pub fn parse_manifest(asset: &str, yaml: &str) -> Result<DynamicObject> {
    let value: serde_json::Value = serde_yaml::from_str(yaml)
        .map_err(|e| Error::ParseError(format!("Invalid YAML in asset {}: {}", asset, e)))?;

    let object: DynamicObject = serde_json::from_value(value)
        .map_err(|e| Error::ParseError(format!("Invalid object in asset {}: {}", asset, e)))?;

    if object.metadata.name.is_none() {
        return Err(Error::ParseError(format!(
            "Asset {} has no metadata.name",
            asset
        )));
    }

    Ok(object)
}

/// Group, version and kind declared by a manifest
pub fn group_version_kind(object: &DynamicObject) -> Result<GroupVersionKind> {
    let types = object.types.as_ref().ok_or_else(|| {
        Error::ParseError(format!(
            "Object {} is missing apiVersion/kind",
            object.name_any()
        ))
    })?;

    let (group, version) = match types.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", types.api_version.as_str()),
    };

    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}

/// Short stable digest of ConfigMap-style data
pub fn data_hash(data: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in data {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Set an annotation on the pod template of a Deployment or DaemonSet
pub fn annotate_pod_template(object: &mut DynamicObject, key: &str, value: &str) -> Result<()> {
    let name = object.name_any();
    let template = object
        .data
        .pointer_mut("/spec/template")
        .and_then(|t| t.as_object_mut())
        .ok_or_else(|| Error::ParseError(format!("Object {} has no pod template", name)))?;

    let metadata = template
        .entry("metadata")
        .or_insert_with(|| serde_json::json!({}));
    let annotations = metadata
        .as_object_mut()
        .ok_or_else(|| Error::ParseError(format!("Object {} has invalid template metadata", name)))?
        .entry("annotations")
        .or_insert_with(|| serde_json::json!({}));

    annotations
        .as_object_mut()
        .ok_or_else(|| Error::ParseError(format!("Object {} has invalid annotations", name)))?
        .insert(key.to_string(), serde_json::Value::String(value.to_string()));

    Ok(())
}

/// Point a CredentialsRequest's generated secret at the given namespace
pub fn set_secret_ref_namespace(object: &mut DynamicObject, namespace: &str) -> Result<()> {
    let name = object.name_any();
    let spec = object
        .data
        .get_mut("spec")
        .and_then(|s| s.as_object_mut())
        .ok_or_else(|| Error::ParseError(format!("CredentialsRequest {} has no spec", name)))?;

    let secret_ref = spec
        .entry("secretRef")
        .or_insert_with(|| serde_json::json!({}));
    secret_ref
        .as_object_mut()
        .ok_or_else(|| Error::ParseError(format!("CredentialsRequest {} has invalid secretRef", name)))?
        .insert(
            "namespace".to_string(),
            serde_json::Value::String(namespace.to_string()),
        );

    Ok(())
}
