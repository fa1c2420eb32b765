use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::Result;

/// Stable identifier of a device within its registry. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(u64);

impl DeviceId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device-{}", self.0)
    }
}

/// Summary of an open device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    /// Transport label (port path).
    pub label: String,
}

/// Teardown entry point the registry holds for each open device.
pub(crate) trait RegisteredDevice: Send + Sync {
    /// Close the device unless already closed; `Ok(false)` if it was.
    fn shutdown(&self) -> Result<bool>;
}

struct Entry {
    info: DeviceInfo,
    device: Arc<dyn RegisteredDevice>,
}

#[derive(Default)]
struct RegistryInner {
    devices: Mutex<BTreeMap<DeviceId, Entry>>,
    next_id: AtomicU64,
}

/// Tracks every open device for enumeration and bulk teardown.
///
/// Cloning yields another handle to the same registry. Membership changes
/// only on open, close and [`close_all`](DeviceRegistry::close_all).
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    inner: Arc<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open devices.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Open devices in id order.
    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.lock().values().map(|e| e.info.clone()).collect()
    }

    /// Close every registered device, returning how many were closed here.
    ///
    /// Devices whose teardown fails are still removed; the failure is logged.
    pub fn close_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.lock());
        let mut closed = 0usize;
        for (id, entry) in drained {
            match entry.device.shutdown() {
                Ok(true) => closed += 1,
                Ok(false) => {}
                Err(err) => {
                    closed += 1;
                    warn!(device = %id, error = %err, "device teardown failed");
                }
            }
        }
        debug!(closed, "closed all devices");
        closed
    }

    pub(crate) fn allocate_id(&self) -> DeviceId {
        DeviceId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn insert(&self, info: DeviceInfo, device: Arc<dyn RegisteredDevice>) {
        self.lock().insert(info.id, Entry { info, device });
    }

    /// Remove a device; false if it was not registered.
    pub(crate) fn remove(&self, id: DeviceId) -> bool {
        self.lock().remove(&id).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<DeviceId, Entry>> {
        self.inner
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.devices())
            .finish()
    }
}
