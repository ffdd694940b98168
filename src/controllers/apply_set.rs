//! Built-in controller set that resyncs every controller on a fixed interval

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::controllers::credentials_request::CredentialsRequestSync;
use crate::controllers::csi_driver::CsiDriverSync;
use crate::controllers::operator_state::{
    gate_on_management_state, LogLevelSync, ManagementStateSync,
};
use crate::controllers::static_resources::StaticResourcesSync;
use crate::controllers::{
    Context, ControllerSet, CredentialsRequestController, CsiDriverController, DriverService,
    ManagementStateController, StaticResourcesController,
};
use crate::metrics::prometheus::{SYNCS, SYNC_DURATION, SYNC_ERRORS};
use crate::Result;

/// One controller driven by [`ApplyControllerSet`]
#[async_trait]
pub trait Syncer: Send + Sync {
    fn name(&self) -> &str;

    /// Whether syncs pause while the operator instance is Unmanaged
    fn honors_management_state(&self) -> bool {
        true
    }

    async fn sync(&self, ctx: &Context) -> Result<()>;
}

/// [`ControllerSet`] that applies manifests with server-side apply
pub struct ApplyControllerSet {
    ctx: Arc<Context>,
    controllers: Vec<Arc<dyn Syncer>>,
}

impl ApplyControllerSet {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self {
            ctx,
            controllers: Vec::new(),
        }
    }

    /// Names of the registered controllers, in registration order
    pub fn controller_names(&self) -> Vec<String> {
        self.controllers
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    fn register(&mut self, controller: impl Syncer + 'static) -> &mut Self {
        self.controllers.push(Arc::new(controller));
        self
    }
}

#[async_trait]
impl ControllerSet for ApplyControllerSet {
    fn with_log_level_controller(&mut self) -> &mut Self {
        self.register(LogLevelSync::new())
    }

    fn with_management_state_controller(
        &mut self,
        operand_name: &str,
        supports_removed: bool,
    ) -> &mut Self {
        self.register(ManagementStateSync::new(ManagementStateController {
            operand_name: operand_name.to_string(),
            supports_removed,
        }))
    }

    fn with_static_resources_controller(&mut self, name: &str, assets: &[&str]) -> &mut Self {
        self.register(StaticResourcesSync::new(StaticResourcesController {
            name: name.to_string(),
            assets: assets.iter().map(|a| a.to_string()).collect(),
        }))
    }

    fn with_credentials_request_controller(
        &mut self,
        name: &str,
        target_namespace: &str,
        asset: &str,
    ) -> &mut Self {
        self.register(CredentialsRequestSync::new(CredentialsRequestController {
            name: name.to_string(),
            target_namespace: target_namespace.to_string(),
            asset: asset.to_string(),
        }))
    }

    fn with_csi_driver_controller(
        &mut self,
        name: &str,
        instance_name: &str,
        operand_name: &str,
        namespace: &str,
        services: Vec<DriverService>,
    ) -> &mut Self {
        self.register(CsiDriverSync::new(CsiDriverController {
            name: name.to_string(),
            instance_name: instance_name.to_string(),
            operand_name: operand_name.to_string(),
            namespace: namespace.to_string(),
            services,
        }))
    }

    async fn run(self, shutdown: CancellationToken, workers: usize) -> Result<()> {
        let Self { ctx, controllers } = self;
        let workers = workers.max(1);
        let permits = Arc::new(Semaphore::new(workers));
        let interval = ctx.config.resync_interval;

        info!(
            "Starting {} controllers with {} workers",
            controllers.len(),
            workers
        );

        let loops = controllers.into_iter().map(|controller| {
            resync_loop(
                controller,
                ctx.clone(),
                permits.clone(),
                interval,
                shutdown.clone(),
            )
        });
        future::join_all(loops).await;

        info!("Controller set stopped");
        Ok(())
    }
}

async fn resync_loop(
    controller: Arc<dyn Syncer>,
    ctx: Arc<Context>,
    permits: Arc<Semaphore>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Ok(_permit) = permits.acquire().await else {
            break;
        };
        run_once(controller.as_ref(), &ctx).await;
    }

    debug!("{} stopped", controller.name());
}

#[instrument(skip_all, fields(controller = %controller.name()))]
async fn run_once(controller: &dyn Syncer, ctx: &Context) {
    if controller.honors_management_state() && !gate_on_management_state(ctx) {
        return;
    }

    let name = controller.name();
    let start = std::time::Instant::now();
    SYNCS.with_label_values(&[name]).inc();

    let result = controller.sync(ctx).await;

    let duration = start.elapsed().as_secs_f64();
    SYNC_DURATION.with_label_values(&[name]).observe(duration);

    match result {
        Ok(()) => debug!("{} synced in {:.2}s", name, duration),
        Err(e) => {
            SYNC_ERRORS.with_label_values(&[name]).inc();
            error!("{} sync failed: {}", name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::assets::AssetDir;
    use crate::adapters::cluster::cluster_csi_driver_resource;
    use crate::config::OperatorConfig;
    use crate::informers::InformerStores;
    use crate::operator::configure_controller_set;
    use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
    use kube::runtime::reflector::{self, store::Writer};
    use kube::Client;

    fn context() -> Arc<Context> {
        let client = Client::try_from(kube::Config::new("http://127.0.0.1:6443".parse().unwrap()))
            .unwrap();
        let stores = InformerStores {
            deployments: reflector::store::<Deployment>().0,
            daemon_sets: reflector::store::<DaemonSet>().0,
            cluster_csi_drivers: Writer::new(cluster_csi_driver_resource()).as_reader(),
        };
        Context::new(
            client,
            OperatorConfig::default(),
            AssetDir::new("assets"),
            stores,
            String::new(),
            None,
        )
    }

    #[tokio::test]
    async fn registers_driver_controllers_in_order() {
        let mut set = ApplyControllerSet::new(context());
        configure_controller_set(&mut set, &OperatorConfig::default());

        assert_eq!(
            set.controller_names(),
            vec![
                "LoggingSyncer",
                "ManagementStateController",
                "KubevirtDriverStaticResources",
                "KubevirtDriverCredentialsRequestController",
                "KubevirtDriverController",
            ]
        );
        assert!(set.controllers.iter().take(2).all(|c| !c.honors_management_state()));
        assert!(set.controllers.iter().skip(2).all(|c| c.honors_management_state()));
    }

    #[tokio::test]
    async fn run_returns_once_cancelled() {
        let mut set = ApplyControllerSet::new(context());
        configure_controller_set(&mut set, &OperatorConfig::default());

        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), set.run(shutdown, 2)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
