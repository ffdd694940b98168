//! Applies the driver's static manifests (RBAC, CSIDriver, driver config)

use async_trait::async_trait;
use tracing::{info, warn};

use crate::controllers::apply_set::Syncer;
use crate::controllers::{Context, StaticResourcesController};
use crate::{Error, Result};

pub struct StaticResourcesSync {
    controller: StaticResourcesController,
}

impl StaticResourcesSync {
    pub fn new(controller: StaticResourcesController) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl Syncer for StaticResourcesSync {
    fn name(&self) -> &str {
        &self.controller.name
    }

    async fn sync(&self, ctx: &Context) -> Result<()> {
        let mut failed = Vec::new();

        // Keep going so one broken manifest does not block the rest
        for asset in &self.controller.assets {
            let applied = match ctx.manifest(asset).await {
                Ok(object) => ctx.apply(&object).await,
                Err(e) => Err(e),
            };
            if let Err(e) = applied {
                warn!("Failed to apply {}: {}", asset, e);
                failed.push(asset.as_str());
            }
        }

        if !failed.is_empty() {
            return Err(Error::KubeError(format!(
                "Failed to apply {} of {} static resources: {}",
                failed.len(),
                self.controller.assets.len(),
                failed.join(", ")
            )));
        }

        info!(
            "Applied {} static resources",
            self.controller.assets.len()
        );
        Ok(())
    }
}
