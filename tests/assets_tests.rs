//! Integration tests for the bundled driver manifests
//!
//! These tests verify that every asset the controllers apply parses into an
//! object with a kind and a name, and that the driver workloads accept the
//! driver config annotation.

use std::path::PathBuf;

use kubevirt_csi_driver_operator::adapters::assets::AssetDir;
use kubevirt_csi_driver_operator::adapters::manifest::{
    annotate_pod_template, group_version_kind, parse_manifest, set_secret_ref_namespace,
};
use kubevirt_csi_driver_operator::operator::{
    CONTROLLER_SERVICE_ASSET, CREDENTIALS_REQUEST_ASSET, NODE_SERVICE_ASSET, STATIC_ASSETS,
};

fn bundled_assets() -> AssetDir {
    AssetDir::new(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets"))
}

#[tokio::test]
async fn static_assets_parse() {
    let assets = bundled_assets();

    // configmap.yaml is generated at startup
    for name in STATIC_ASSETS.iter().filter(|a| **a != "configmap.yaml") {
        let yaml = assets.read(name).await.unwrap();
        let object = parse_manifest(name, &yaml).unwrap();
        let gvk = group_version_kind(&object).unwrap();
        assert!(!gvk.kind.is_empty(), "{} has no kind", name);
    }
}

#[tokio::test]
async fn driver_services_accept_config_hash() {
    let assets = bundled_assets();

    for (name, kind) in [
        (CONTROLLER_SERVICE_ASSET, "Deployment"),
        (NODE_SERVICE_ASSET, "DaemonSet"),
    ] {
        let yaml = assets.read(name).await.unwrap();
        let mut object = parse_manifest(name, &yaml).unwrap();
        assert_eq!(group_version_kind(&object).unwrap().kind, kind);

        annotate_pod_template(&mut object, "operator.openshift.io/dep-driver-config", "0123")
            .unwrap();
        let labels = object.data.pointer("/spec/template/metadata/labels");
        assert!(labels.is_some(), "{} lost its template labels", name);
    }
}

#[tokio::test]
async fn credentials_request_targets_operator_namespace() {
    let assets = bundled_assets();
    let yaml = assets.read(CREDENTIALS_REQUEST_ASSET).await.unwrap();
    let mut object = parse_manifest(CREDENTIALS_REQUEST_ASSET, &yaml).unwrap();

    set_secret_ref_namespace(&mut object, "openshift-cluster-csi-drivers").unwrap();

    assert_eq!(
        object
            .data
            .pointer("/spec/secretRef/namespace")
            .and_then(|v| v.as_str()),
        Some("openshift-cluster-csi-drivers")
    );
}
