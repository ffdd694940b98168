//! KubeVirt CSI Driver Operator
//!
//! Main entry point for the operator. Sets up tracing and the Kubernetes
//! client, runs the startup steps and the driver controllers until a
//! shutdown signal arrives.

use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use kubevirt_csi_driver_operator::{
    config::Cli, controllers::LogLevelSetter, metrics, operator, Error,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_level = init_tracing();
    let config = Cli::parse().into_config();

    info!("Starting KubeVirt CSI Driver Operator");

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let metrics_handle = tokio::spawn(metrics::serve(config.metrics_port));
    info!("Metrics server starting on port {}", config.metrics_port);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let result = tokio::select! {
        result = operator::run_operator(client, config, Some(log_level), shutdown.clone()) => result,
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
            shutdown.cancel();
            anyhow::bail!("metrics server exited");
        }
    };

    match result {
        Err(Error::Stopped) | Ok(()) => {
            info!("KubeVirt CSI Driver Operator stopped");
            Ok(())
        }
        Err(e) => {
            error!("Operator failed: {}", e);
            Err(e.into())
        }
    }
}

/// Filter directives with the operator's own targets at `level`
fn filter_directives(level: &str) -> String {
    format!(
        "info,kubevirt_csi_driver_operator={},kube=warn,hyper=warn",
        level
    )
}

/// Initialize tracing subscriber, returning a handle that swaps the level
fn init_tracing() -> LogLevelSetter {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives("debug")));
    let (filter, handle) = reload::Layer::new(env_filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    Arc::new(move |level: &str| {
        handle
            .reload(EnvFilter::new(filter_directives(level)))
            .map_err(|e| Error::ConfigError(format!("Failed to reload log filter: {}", e)))
    })
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install CTRL+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
