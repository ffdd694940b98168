//! One-shot startup steps run before the controllers start

pub mod driver_config;
pub mod storage_class;

pub use storage_class::Provisioning;
