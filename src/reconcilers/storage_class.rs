//! Startup step provisioning the tenant StorageClass

use tracing::{debug, info, warn};

use crate::adapters::cluster::StartupCluster;
use crate::adapters::storage_class::{
    build_storage_class, storage_class_from_install_config, storage_class_from_machine_set,
};
use crate::config::OperatorConfig;
use crate::metrics::prometheus::STORAGE_CLASS_PROVISIONING;
use crate::Result;

/// Outcome of [`ensure_storage_class`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioning {
    /// A StorageClass with the configured name already existed
    AlreadyPresent,
    /// The StorageClass was created referencing the given infra storage class
    Created { infra_storage_class: String },
    /// No infra storage class could be discovered
    Skipped,
}

impl Provisioning {
    fn outcome(&self) -> &'static str {
        match self {
            Provisioning::AlreadyPresent => "already_present",
            Provisioning::Created { .. } => "created",
            Provisioning::Skipped => "skipped",
        }
    }
}

/// Make sure the tenant StorageClass exists, creating it when an infra
/// storage class can be discovered
pub async fn ensure_storage_class(
    cluster: &dyn StartupCluster,
    config: &OperatorConfig,
) -> Result<Provisioning> {
    let result = provision(cluster, config).await?;

    STORAGE_CLASS_PROVISIONING
        .with_label_values(&[result.outcome()])
        .inc();

    Ok(result)
}

async fn provision(cluster: &dyn StartupCluster, config: &OperatorConfig) -> Result<Provisioning> {
    if cluster
        .get_storage_class(&config.storage_class_name)
        .await?
        .is_some()
    {
        debug!("StorageClass {} already exists", config.storage_class_name);
        return Ok(Provisioning::AlreadyPresent);
    }

    let Some(infra_storage_class) = resolve_infra_storage_class(cluster, config).await? else {
        warn!(
            "No infra storage class found in install-config or MachineSets, not creating StorageClass {}",
            config.storage_class_name
        );
        return Ok(Provisioning::Skipped);
    };

    let storage_class = build_storage_class(config, &infra_storage_class);
    cluster.create_storage_class(&storage_class).await?;

    info!(
        "Created StorageClass {} for infra storage class {}",
        config.storage_class_name, infra_storage_class
    );

    Ok(Provisioning::Created {
        infra_storage_class,
    })
}

/// Infra storage class named by the installer, falling back to the first MachineSet
pub async fn resolve_infra_storage_class(
    cluster: &dyn StartupCluster,
    config: &OperatorConfig,
) -> Result<Option<String>> {
    if let Some(install_config) = cluster
        .get_config_map(&config.install_config_namespace, &config.install_config_name)
        .await?
    {
        if let Some(name) = storage_class_from_install_config(&install_config)? {
            debug!("Using infra storage class {} from install-config", name);
            return Ok(Some(name));
        }
    }

    let machine_sets = cluster
        .list_machine_sets(&config.machine_api_namespace)
        .await?;

    let name = machine_sets.first().and_then(storage_class_from_machine_set);
    if let Some(name) = &name {
        debug!("Using infra storage class {} from MachineSet", name);
    }

    Ok(name)
}
