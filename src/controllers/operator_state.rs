//! Log level and management state of the ClusterCSIDriver instance

use std::sync::Mutex;

use async_trait::async_trait;
use kube::api::DynamicObject;
use tracing::{debug, info, warn};

use crate::controllers::apply_set::Syncer;
use crate::controllers::{Context, ManagementStateController};
use crate::{Error, Result};

/// `spec.managementState` of an operator resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementState {
    Managed,
    Unmanaged,
    Removed,
}

impl ManagementState {
    /// Parse the field value; an empty value means Managed
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "" | "Managed" => Some(ManagementState::Managed),
            "Unmanaged" => Some(ManagementState::Unmanaged),
            "Removed" => Some(ManagementState::Removed),
            _ => None,
        }
    }

    pub fn of(instance: &DynamicObject) -> Option<Self> {
        Self::parse(spec_str(instance, "managementState"))
    }
}

/// `spec.operatorLogLevel` of an operator resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Normal,
    Debug,
    Trace,
    TraceAll,
}

impl LogLevel {
    /// Parse the field value; empty or unknown values fall back to Normal
    pub fn parse(value: &str) -> Self {
        match value {
            "Debug" => LogLevel::Debug,
            "Trace" => LogLevel::Trace,
            "TraceAll" => LogLevel::TraceAll,
            _ => LogLevel::Normal,
        }
    }

    pub fn of(instance: &DynamicObject) -> Self {
        Self::parse(spec_str(instance, "operatorLogLevel"))
    }

    /// Tracing level for the operator's own targets
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Normal => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace | LogLevel::TraceAll => "trace",
        }
    }
}

fn spec_str<'a>(instance: &'a DynamicObject, field: &str) -> &'a str {
    instance
        .data
        .get("spec")
        .and_then(|spec| spec.get(field))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
}

/// Whether managed resources may be synced right now
pub fn gate_on_management_state(ctx: &Context) -> bool {
    let Some(instance) = ctx.operator_instance() else {
        debug!(
            "ClusterCSIDriver {} not observed yet, skipping sync",
            ctx.config.instance_name
        );
        return false;
    };

    match ManagementState::of(&instance) {
        Some(ManagementState::Managed) => true,
        Some(ManagementState::Unmanaged) => {
            debug!("Operator is Unmanaged, skipping sync");
            false
        }
        Some(ManagementState::Removed) => false,
        None => {
            warn!(
                "Unknown management state {:?}, skipping sync",
                spec_str(&instance, "managementState")
            );
            false
        }
    }
}

/// Reports unsupported management states
pub struct ManagementStateSync {
    controller: ManagementStateController,
    last: Mutex<Option<ManagementState>>,
}

impl ManagementStateSync {
    pub fn new(controller: ManagementStateController) -> Self {
        Self {
            controller,
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Syncer for ManagementStateSync {
    fn name(&self) -> &str {
        "ManagementStateController"
    }

    fn honors_management_state(&self) -> bool {
        false
    }

    async fn sync(&self, ctx: &Context) -> Result<()> {
        let instance = ctx.operator_instance().ok_or_else(|| {
            Error::ConfigError(format!(
                "ClusterCSIDriver {} not found",
                ctx.config.instance_name
            ))
        })?;

        let state = ManagementState::of(&instance).ok_or_else(|| {
            Error::ConfigError(format!(
                "Unknown management state {:?}",
                spec_str(&instance, "managementState")
            ))
        })?;

        if let Ok(mut last) = self.last.lock() {
            if *last != Some(state) {
                info!(
                    "{} management state is now {:?}",
                    self.controller.operand_name, state
                );
                *last = Some(state);
            }
        }

        if state == ManagementState::Removed && !self.controller.supports_removed {
            return Err(Error::ConfigError(format!(
                "Removed management state is not supported for {}",
                self.controller.operand_name
            )));
        }

        Ok(())
    }
}

/// Applies the requested operator log level to the tracing subscriber
pub struct LogLevelSync {
    applied: Mutex<Option<LogLevel>>,
}

impl LogLevelSync {
    pub fn new() -> Self {
        Self {
            applied: Mutex::new(None),
        }
    }
}

impl Default for LogLevelSync {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Syncer for LogLevelSync {
    fn name(&self) -> &str {
        "LoggingSyncer"
    }

    fn honors_management_state(&self) -> bool {
        false
    }

    async fn sync(&self, ctx: &Context) -> Result<()> {
        let (Some(instance), Some(setter)) = (ctx.operator_instance(), ctx.log_level.as_ref())
        else {
            return Ok(());
        };

        let desired = LogLevel::of(&instance);
        let Ok(mut applied) = self.applied.lock() else {
            return Ok(());
        };
        if *applied == Some(desired) {
            return Ok(());
        }

        (**setter)(desired.directive())?;
        info!("Operator log level set to {:?}", desired);
        *applied = Some(desired);
        Ok(())
    }
}
