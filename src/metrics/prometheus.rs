//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Total number of controller syncs
    pub static ref SYNCS: CounterVec = register_counter_vec!(
        "kubevirt_csi_driver_operator_syncs_total",
        "Total number of controller syncs",
        &["controller"]
    ).unwrap();

    /// Total number of failed controller syncs
    pub static ref SYNC_ERRORS: CounterVec = register_counter_vec!(
        "kubevirt_csi_driver_operator_sync_errors_total",
        "Total number of failed controller syncs",
        &["controller"]
    ).unwrap();

    /// Sync duration histogram
    pub static ref SYNC_DURATION: HistogramVec = register_histogram_vec!(
        "kubevirt_csi_driver_operator_sync_duration_seconds",
        "Duration of controller syncs in seconds",
        &["controller"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// StorageClass provisioning outcomes at startup
    pub static ref STORAGE_CLASS_PROVISIONING: CounterVec = register_counter_vec!(
        "kubevirt_csi_driver_operator_storage_class_provisioning_total",
        "StorageClass provisioning attempts by outcome",
        &["outcome"]
    ).unwrap();

    /// Operand readiness per driver service (1 = ready)
    pub static ref OPERAND_READY: GaugeVec = register_gauge_vec!(
        "kubevirt_csi_driver_operator_operand_ready",
        "Whether the driver service is fully rolled out",
        &["service"]
    ).unwrap();

    /// Operator health (1 = healthy, 0 = unhealthy)
    pub static ref OPERATOR_HEALTH: prometheus::Gauge = prometheus::register_gauge!(
        "kubevirt_csi_driver_operator_health",
        "Operator health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Set once the startup steps have finished
static READY: AtomicBool = AtomicBool::new(false);

/// Mark the operator ready (or not) for `/readyz`
pub fn set_ready(ready: bool) {
    READY.store(ready, Ordering::SeqCst);
}

pub fn is_ready() -> bool {
    READY.load(Ordering::SeqCst)
}

/// Start the metrics HTTP server
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    OPERATOR_HEALTH.set(1.0);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    Ok(route(req.uri().path()))
}

fn route(path: &str) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => metrics_response(),
        "/healthz" | "/health" => text_response(StatusCode::OK, "ok"),
        "/readyz" | "/ready" if is_ready() => text_response(StatusCode::OK, "ok"),
        "/readyz" | "/ready" => text_response(StatusCode::SERVICE_UNAVAILABLE, "starting"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(content_type) = encoder.format_type().parse() {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, content_type);
    }
    response
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}
