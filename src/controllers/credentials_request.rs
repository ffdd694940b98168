//! Applies the CredentialsRequest granting the driver access to the infra cluster

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::info;

use crate::adapters::manifest;
use crate::controllers::apply_set::Syncer;
use crate::controllers::{Context, CredentialsRequestController};
use crate::Result;

/// Namespace watched by the cloud credential operator
pub const CLOUD_CREDENTIAL_NAMESPACE: &str = "openshift-cloud-credential-operator";

pub struct CredentialsRequestSync {
    controller: CredentialsRequestController,
}

impl CredentialsRequestSync {
    pub fn new(controller: CredentialsRequestController) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl Syncer for CredentialsRequestSync {
    fn name(&self) -> &str {
        &self.controller.name
    }

    async fn sync(&self, ctx: &Context) -> Result<()> {
        let mut request = ctx.manifest(&self.controller.asset).await?;

        manifest::set_secret_ref_namespace(&mut request, &self.controller.target_namespace)?;
        if request.metadata.namespace.is_none() {
            request.metadata.namespace = Some(CLOUD_CREDENTIAL_NAMESPACE.to_string());
        }

        ctx.apply(&request).await?;

        info!(
            "Applied CredentialsRequest {} for namespace {}",
            request.name_any(),
            self.controller.target_namespace
        );
        Ok(())
    }
}
