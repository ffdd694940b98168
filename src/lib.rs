//! KubeVirt CSI Driver Operator
//!
//! Installs the KubeVirt CSI driver into a tenant cluster: derives the driver
//! configuration from the cloud provider config, provisions a default
//! StorageClass backed by an infra cluster storage class, and keeps the
//! driver manifests applied.

pub mod adapters;
pub mod config;
pub mod controllers;
pub mod error;
pub mod informers;
pub mod metrics;
pub mod operator;
pub mod reconcilers;

pub use error::{Error, Result};
