use std::fmt;
use std::sync::Arc;

use adapterlink_transport::RawSource;

use crate::error::{DeviceError, Result};
use crate::registry::DeviceId;

/// Failure reported by an event-source hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HookError(pub String);

/// What a device asks the host event loop to watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSource {
    /// Device the source belongs to.
    pub device: DeviceId,
    /// Readiness source of the transport, if it has one.
    pub fd: Option<RawSource>,
    /// Transport label (port path).
    pub label: String,
}

pub type HookResult = std::result::Result<(), HookError>;

/// Adds a device's readiness source to the host event loop.
pub type RegisterHook = Arc<dyn Fn(&EventSource) -> HookResult + Send + Sync>;

/// Removes a device's readiness source from the host event loop.
pub type RemoveHook = Arc<dyn Fn(&EventSource) -> HookResult + Send + Sync>;

/// Event-loop integration supplied at open time.
///
/// Both hooks are mandatory; opening a device without one fails before any
/// resource is acquired.
#[derive(Clone, Default)]
pub struct SourceHooks {
    pub register: Option<RegisterHook>,
    pub remove: Option<RemoveHook>,
}

impl SourceHooks {
    /// Hooks from two closures.
    pub fn new<R, D>(register: R, remove: D) -> Self
    where
        R: Fn(&EventSource) -> HookResult + Send + Sync + 'static,
        D: Fn(&EventSource) -> HookResult + Send + Sync + 'static,
    {
        let register: RegisterHook = Arc::new(register);
        let remove: RemoveHook = Arc::new(remove);
        Self {
            register: Some(register),
            remove: Some(remove),
        }
    }

    /// Hooks that only log, for callers that drive devices with [`Device::pump`].
    ///
    /// [`Device::pump`]: crate::Device::pump
    pub fn detached() -> Self {
        Self::new(
            |source| {
                tracing::debug!(device = %source.device, label = %source.label, "source attached");
                Ok(())
            },
            |source| {
                tracing::debug!(device = %source.device, label = %source.label, "source detached");
                Ok(())
            },
        )
    }

    pub(crate) fn validate(&self) -> Result<(RegisterHook, RemoveHook)> {
        let register = self
            .register
            .clone()
            .ok_or(DeviceError::MissingHook("register"))?;
        let remove = self
            .remove
            .clone()
            .ok_or(DeviceError::MissingHook("remove"))?;
        Ok((register, remove))
    }
}

impl fmt::Debug for SourceHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceHooks")
            .field("register", &self.register.is_some())
            .field("remove", &self.remove.is_some())
            .finish()
    }
}
