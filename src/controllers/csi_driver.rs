//! Deploys the CSI driver controller and node services and reports their rollout

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::api::{DynamicObject, Patch, PatchParams};
use kube::runtime::reflector::ObjectRef;
use kube::{Api, ResourceExt};
use serde_json::{json, Value};
use tracing::info;

use crate::adapters::cluster::cluster_csi_driver_resource;
use crate::adapters::manifest;
use crate::controllers::apply_set::Syncer;
use crate::controllers::{Context, CsiDriverController, DriverService};
use crate::metrics::prometheus::OPERAND_READY;
use crate::{Error, Result};

/// Pod template annotation carrying the driver config digest
pub const DRIVER_CONFIG_HASH_ANNOTATION: &str = "operator.openshift.io/dep-driver-config";

pub struct CsiDriverSync {
    controller: CsiDriverController,
}

impl CsiDriverSync {
    pub fn new(controller: CsiDriverController) -> Self {
        Self { controller }
    }

    async fn apply_service(&self, ctx: &Context, service: &DriverService) -> Result<String> {
        let mut object = ctx.manifest(service.asset()).await?;
        object.metadata.namespace = Some(self.controller.namespace.clone());
        manifest::annotate_pod_template(
            &mut object,
            DRIVER_CONFIG_HASH_ANNOTATION,
            &ctx.driver_config_hash,
        )?;

        ctx.apply(&object).await?;
        Ok(object.name_any())
    }

    fn service_ready(&self, ctx: &Context, service: &DriverService, name: &str) -> bool {
        match service {
            DriverService::Controller(_) => ctx
                .stores
                .deployments
                .get(&ObjectRef::new(name).within(&self.controller.namespace))
                .is_some_and(|d| deployment_ready(&d)),
            DriverService::Node(_) => ctx
                .stores
                .daemon_sets
                .get(&ObjectRef::new(name).within(&self.controller.namespace))
                .is_some_and(|ds| daemon_set_ready(&ds)),
        }
    }

    async fn update_status(&self, ctx: &Context, ready: bool, pending: &[String]) -> Result<()> {
        let Some(instance) = ctx.operator_instance() else {
            return Ok(());
        };

        let mut conditions = current_conditions(&instance);
        let now = Utc::now();
        let message = if ready {
            format!("{} is available", self.controller.operand_name)
        } else {
            format!("Waiting for {}", pending.join(", "))
        };

        let mut changed = set_condition(
            &mut conditions,
            &format!("{}Available", self.controller.name),
            ready,
            if ready { "AsExpected" } else { "Deploying" },
            &message,
            now,
        );
        changed |= set_condition(
            &mut conditions,
            &format!("{}Progressing", self.controller.name),
            !ready,
            if ready { "AsExpected" } else { "Deploying" },
            &message,
            now,
        );

        if !changed {
            return Ok(());
        }

        let api: Api<DynamicObject> =
            Api::all_with(ctx.client.clone(), &cluster_csi_driver_resource());
        let patch = status_patch(&instance, conditions);
        api.patch_status(
            &self.controller.instance_name,
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| {
            Error::KubeError(format!(
                "Failed to update ClusterCSIDriver {} status: {}",
                self.controller.instance_name, e
            ))
        })?;

        Ok(())
    }
}

#[async_trait]
impl Syncer for CsiDriverSync {
    fn name(&self) -> &str {
        &self.controller.name
    }

    async fn sync(&self, ctx: &Context) -> Result<()> {
        let mut pending = Vec::new();

        for service in &self.controller.services {
            let name = self.apply_service(ctx, service).await?;
            let ready = self.service_ready(ctx, service, &name);

            OPERAND_READY
                .with_label_values(&[service.label()])
                .set(if ready { 1.0 } else { 0.0 });
            if !ready {
                pending.push(format!("{} {}", service.label(), name));
            }
        }

        let ready = pending.is_empty();
        self.update_status(ctx, ready, &pending).await?;

        info!(
            "{} services applied, ready={}",
            self.controller.operand_name, ready
        );
        Ok(())
    }
}

/// Whether every desired replica is updated and available
pub fn deployment_ready(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let Some(status) = deployment.status.as_ref() else {
        return false;
    };

    let observed = status.observed_generation.unwrap_or(0) >= deployment.metadata.generation.unwrap_or(0);
    observed
        && status.updated_replicas.unwrap_or(0) >= desired
        && status.available_replicas.unwrap_or(0) >= desired
}

/// Whether every scheduled node pod is updated and available
pub fn daemon_set_ready(daemon_set: &DaemonSet) -> bool {
    let Some(status) = daemon_set.status.as_ref() else {
        return false;
    };

    let desired = status.desired_number_scheduled;
    let observed = status.observed_generation.unwrap_or(0) >= daemon_set.metadata.generation.unwrap_or(0);
    observed
        && status.updated_number_scheduled.unwrap_or(0) >= desired
        && status.number_available.unwrap_or(0) >= desired
}

/// Status merge patch guarded by the cached resourceVersion
///
/// The API server rejects the patch with a conflict when the instance has
/// changed since the informer saw it.
pub fn status_patch(instance: &DynamicObject, conditions: Vec<Value>) -> Value {
    let mut patch = json!({ "status": { "conditions": conditions } });
    if let Some(version) = instance.resource_version() {
        patch["metadata"] = json!({ "resourceVersion": version });
    }
    patch
}

fn current_conditions(instance: &DynamicObject) -> Vec<Value> {
    instance
        .data
        .pointer("/status/conditions")
        .and_then(|c| c.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Insert or update an operator condition, returning whether anything changed
///
/// `lastTransitionTime` only moves when the status flips.
pub fn set_condition(
    conditions: &mut Vec<Value>,
    type_: &str,
    status: bool,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) -> bool {
    let status = if status { "True" } else { "False" };
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);

    let existing = conditions
        .iter_mut()
        .find(|c| c.get("type").and_then(|t| t.as_str()) == Some(type_));

    match existing {
        Some(condition) => {
            let same = condition.get("status").and_then(|s| s.as_str()) == Some(status)
                && condition.get("reason").and_then(|s| s.as_str()) == Some(reason)
                && condition.get("message").and_then(|s| s.as_str()) == Some(message);
            if same {
                return false;
            }

            if condition.get("status").and_then(|s| s.as_str()) != Some(status) {
                condition["lastTransitionTime"] = Value::String(timestamp);
            }
            condition["status"] = Value::String(status.to_string());
            condition["reason"] = Value::String(reason.to_string());
            condition["message"] = Value::String(message.to_string());
            true
        }
        None => {
            conditions.push(json!({
                "type": type_,
                "status": status,
                "reason": reason,
                "message": message,
                "lastTransitionTime": timestamp,
            }));
            true
        }
    }
}
