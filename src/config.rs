//! Operator configuration
//!
//! Every namespace, resource name and identifier the operator touches lives in
//! [`OperatorConfig`], which is built once in `main` and handed to the
//! components that need it.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Namespace shared by the operator and its operand
pub const DEFAULT_NAMESPACE: &str = "openshift-cluster-csi-drivers";
/// Name of the operator, used as field manager and user agent
pub const OPERATOR_NAME: &str = "kubevirt-csi-driver-operator";
/// Name of the managed CSI driver
pub const OPERAND_NAME: &str = "kubevirt-csi-driver";
/// Name of the ClusterCSIDriver instance and the CSI provisioner
pub const INSTANCE_NAME: &str = "csi.kubevirt.io";

/// Immutable runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace the operator and the driver run in
    pub operator_namespace: String,
    pub operator_name: String,
    pub operand_name: String,
    /// ClusterCSIDriver instance name
    pub instance_name: String,

    /// Source of the infra cluster namespace and infra ID
    pub cloud_config_namespace: String,
    pub cloud_config_name: String,
    /// Name of the derived driver ConfigMap
    pub driver_config_name: String,

    /// Installer config holding the preferred infra storage class
    pub install_config_namespace: String,
    pub install_config_name: String,
    /// Namespace listed for MachineSets as the storage class fallback
    pub machine_api_namespace: String,

    /// StorageClass created for tenant workloads
    pub storage_class_name: String,
    /// CSI provisioner referenced by the StorageClass
    pub provisioner: String,

    /// Directory holding the manifest assets
    pub assets_dir: PathBuf,
    pub metrics_port: u16,
    pub resync_interval: Duration,
    pub workers: usize,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            operator_namespace: DEFAULT_NAMESPACE.to_string(),
            operator_name: OPERATOR_NAME.to_string(),
            operand_name: OPERAND_NAME.to_string(),
            instance_name: INSTANCE_NAME.to_string(),
            cloud_config_namespace: "openshift-config".to_string(),
            cloud_config_name: "cloud-provider-config".to_string(),
            driver_config_name: "driver-config".to_string(),
            install_config_namespace: "kube-system".to_string(),
            install_config_name: "cluster-config-v1".to_string(),
            machine_api_namespace: "openshift-machine-api".to_string(),
            storage_class_name: "kubevirt".to_string(),
            provisioner: INSTANCE_NAME.to_string(),
            assets_dir: PathBuf::from("assets"),
            metrics_port: 8080,
            resync_interval: Duration::from_secs(60),
            workers: 1,
        }
    }
}

/// Command line flags, each also readable from the environment
#[derive(Debug, Parser)]
#[command(name = "kubevirt-csi-driver-operator", version, about)]
pub struct Cli {
    /// Directory containing the driver manifests
    #[arg(long, env = "ASSETS_DIR", default_value = "assets")]
    pub assets_dir: PathBuf,

    /// Port for the metrics and health endpoints
    #[arg(long, env = "METRICS_PORT", default_value_t = 8080)]
    pub metrics_port: u16,

    /// Seconds between controller resyncs
    #[arg(long, env = "RESYNC_INTERVAL_SECS", default_value_t = 60)]
    pub resync_interval_secs: u64,

    /// Namespace the driver is installed into
    #[arg(long, env = "OPERATOR_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub operator_namespace: String,

    /// Name of the StorageClass provisioned at startup
    #[arg(long, env = "STORAGE_CLASS_NAME", default_value = "kubevirt")]
    pub storage_class_name: String,

    /// Number of concurrent workers per controller
    #[arg(long, env = "WORKERS", default_value_t = 1)]
    pub workers: usize,
}

impl Cli {
    /// Build the runtime configuration, keeping defaults for anything not exposed
    pub fn into_config(self) -> OperatorConfig {
        OperatorConfig {
            operator_namespace: self.operator_namespace,
            storage_class_name: self.storage_class_name,
            assets_dir: self.assets_dir,
            metrics_port: self.metrics_port,
            resync_interval: Duration::from_secs(self.resync_interval_secs.max(1)),
            workers: self.workers.max(1),
            ..OperatorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_config_defaults() {
        let cli = Cli::parse_from(["kubevirt-csi-driver-operator"]);
        assert_eq!(cli.into_config(), OperatorConfig::default());
    }

    #[test]
    fn cli_overrides_apply() {
        let cli = Cli::parse_from([
            "kubevirt-csi-driver-operator",
            "--assets-dir",
            "/var/lib/assets",
            "--operator-namespace",
            "csi",
            "--resync-interval-secs",
            "0",
            "--workers",
            "0",
        ]);
        let config = cli.into_config();
        assert_eq!(config.assets_dir, PathBuf::from("/var/lib/assets"));
        assert_eq!(config.operator_namespace, "csi");
        assert_eq!(config.resync_interval, Duration::from_secs(1));
        assert_eq!(config.workers, 1);
        assert_eq!(config.instance_name, INSTANCE_NAME);
    }
}
