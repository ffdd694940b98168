//! Error types for the KubeVirt CSI Driver Operator

use thiserror::Error;

/// Result type for the operator
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the operator
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error with context
    #[error("Kubernetes API error: {0}")]
    KubeError(String),

    /// Missing or invalid startup configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Embedded JSON/YAML document could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Manifest asset could not be read or written
    #[error("Asset error: {0}")]
    AssetError(String),

    /// The operator observed its shutdown signal
    #[error("stopped")]
    Stopped,
}

/// True when a client error is an API 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}
