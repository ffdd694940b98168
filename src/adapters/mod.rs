//! Adapters for configuration transformation, manifests and cluster access

pub mod assets;
pub mod cluster;
pub mod driver_config;
pub mod manifest;
pub mod storage_class;
