//! Prometheus metrics for the KubeVirt CSI Driver Operator
//!
//! Exposes sync counters, startup outcomes and health/readiness endpoints.

pub mod prometheus;

pub use prometheus::*;
