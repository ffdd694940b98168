//! Integration tests for the operator bootstrap
//!
//! These tests drive the startup steps against a fake cluster and check the
//! controllers registered on a recording controller set.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::FakeCluster;
use kubevirt_csi_driver_operator::adapters::assets::AssetDir;
use kubevirt_csi_driver_operator::config::OperatorConfig;
use kubevirt_csi_driver_operator::controllers::{ControllerSet, DriverService};
use kubevirt_csi_driver_operator::operator::{
    configure_controller_set, prepare, start_and_wait, STATIC_ASSETS,
};
use kubevirt_csi_driver_operator::reconcilers::Provisioning;
use kubevirt_csi_driver_operator::{Error, Result};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

/// Controller set that records registrations and runs until cancelled
#[derive(Default)]
struct RecordingControllerSet {
    registrations: Vec<String>,
    static_assets: Vec<String>,
    services: Vec<DriverService>,
    credentials_namespace: Option<String>,
    runs: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl ControllerSet for RecordingControllerSet {
    fn with_log_level_controller(&mut self) -> &mut Self {
        self.registrations.push("LogLevel".to_string());
        self
    }

    fn with_management_state_controller(
        &mut self,
        operand_name: &str,
        supports_removed: bool,
    ) -> &mut Self {
        self.registrations
            .push(format!("ManagementState:{}:{}", operand_name, supports_removed));
        self
    }

    fn with_static_resources_controller(&mut self, name: &str, assets: &[&str]) -> &mut Self {
        self.registrations.push(name.to_string());
        self.static_assets = assets.iter().map(|a| a.to_string()).collect();
        self
    }

    fn with_credentials_request_controller(
        &mut self,
        name: &str,
        target_namespace: &str,
        _asset: &str,
    ) -> &mut Self {
        self.registrations.push(name.to_string());
        self.credentials_namespace = Some(target_namespace.to_string());
        self
    }

    fn with_csi_driver_controller(
        &mut self,
        name: &str,
        _instance_name: &str,
        _operand_name: &str,
        _namespace: &str,
        services: Vec<DriverService>,
    ) -> &mut Self {
        self.registrations.push(name.to_string());
        self.services = services;
        self
    }

    async fn run(self, shutdown: CancellationToken, workers: usize) -> Result<()> {
        self.runs.lock().unwrap().push(workers);
        shutdown.cancelled().await;
        Ok(())
    }
}

fn tenant_cluster() -> FakeCluster {
    FakeCluster::new().with_cloud_config(r#"{"namespace":"ns1","infraID":"abc"}"#)
}

// ============================================================================
// Startup steps
// ============================================================================

#[tokio::test]
async fn startup_completes_without_infra_storage_class() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = tenant_cluster();

    let startup = prepare(&cluster, &OperatorConfig::default(), &AssetDir::new(dir.path()))
        .await
        .unwrap();

    assert_eq!(startup.storage_class, Provisioning::Skipped);
    assert!(dir.path().join("configmap.yaml").exists());
    assert!(!cluster.called("create_storage_class"));
}

#[tokio::test]
async fn startup_runs_config_before_storage_class() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = tenant_cluster().with_storage_class("kubevirt");

    prepare(&cluster, &OperatorConfig::default(), &AssetDir::new(dir.path()))
        .await
        .unwrap();

    assert_eq!(
        cluster.calls(),
        vec![
            "get_config_map openshift-config/cloud-provider-config",
            "get_storage_class kubevirt",
        ]
    );
}

#[tokio::test]
async fn startup_aborts_on_bad_cloud_config() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = FakeCluster::new().with_cloud_config(r#"{"infraID":"abc"}"#);

    let result = prepare(&cluster, &OperatorConfig::default(), &AssetDir::new(dir.path())).await;

    assert!(result.is_err());
    assert!(!cluster.called("get_storage_class"));
}

// ============================================================================
// Controller registration
// ============================================================================

#[test]
fn registers_driver_controllers() {
    let mut set = RecordingControllerSet::default();
    configure_controller_set(&mut set, &OperatorConfig::default());

    assert_eq!(
        set.registrations,
        vec![
            "LogLevel",
            "ManagementState:kubevirt-csi-driver:false",
            "KubevirtDriverStaticResources",
            "KubevirtDriverCredentialsRequestController",
            "KubevirtDriverController",
        ]
    );
    assert_eq!(set.static_assets, STATIC_ASSETS);
    assert_eq!(set.static_assets[0], "configmap.yaml");
    assert_eq!(set.static_assets.len(), 11);
    assert_eq!(
        set.services,
        vec![
            DriverService::Controller("controller.yaml".to_string()),
            DriverService::Node("node.yaml".to_string()),
        ]
    );
    assert_eq!(
        set.credentials_namespace.as_deref(),
        Some("openshift-cluster-csi-drivers")
    );
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn returns_stopped_after_cancellation() {
    let set = RecordingControllerSet::default();
    let runs = set.runs.clone();
    let shutdown = CancellationToken::new();

    let handle = tokio::spawn(start_and_wait(set, Vec::new(), 2, shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());

    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(result, Err(Error::Stopped)));
    assert_eq!(*runs.lock().unwrap(), vec![2]);
}
