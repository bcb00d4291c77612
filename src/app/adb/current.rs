//! The "current device" value shared between the poller (sole writer) and
//! everything that reacts to it (shell session, front-ends).

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::app::models::AdbDevice;

#[derive(Debug, Default)]
struct Slot {
    device: Option<AdbDevice>,
    version: u64,
}

#[derive(Debug, Default)]
struct Shared {
    slot: Mutex<Slot>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        // The slot holds plain data; a panic while holding it cannot leave it torn.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Write half. Not `Clone`: exactly one owner can change the current device.
#[derive(Debug)]
pub struct CurrentDevicePublisher {
    shared: Arc<Shared>,
}

/// Read half. Cheap to clone, hand one to every observer.
#[derive(Debug, Clone)]
pub struct CurrentDeviceWatch {
    shared: Arc<Shared>,
}

pub fn current_device_channel() -> (CurrentDevicePublisher, CurrentDeviceWatch) {
    let shared = Arc::new(Shared::default());
    (
        CurrentDevicePublisher {
            shared: Arc::clone(&shared),
        },
        CurrentDeviceWatch { shared },
    )
}

impl CurrentDevicePublisher {
    pub fn publish(&self, device: Option<AdbDevice>) {
        let mut slot = self.shared.lock();
        slot.device = device;
        slot.version = slot.version.wrapping_add(1);
        drop(slot);
        self.shared.changed.notify_all();
    }

    pub fn watch(&self) -> CurrentDeviceWatch {
        CurrentDeviceWatch {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl CurrentDeviceWatch {
    pub fn get(&self) -> Option<AdbDevice> {
        self.shared.lock().device.clone()
    }

    /// Serial of the current device, empty when none is selected.
    pub fn serial(&self) -> String {
        self.shared
            .lock()
            .device
            .as_ref()
            .map(|device| device.serial.clone())
            .unwrap_or_default()
    }

    /// Incremented on every publish, including republishing the same device.
    pub fn version(&self) -> u64 {
        self.shared.lock().version
    }

    /// Blocks until the version moves past `seen` or `timeout` elapses.
    /// Returns the new version and value on change.
    pub fn wait_for_change(&self, seen: u64, timeout: Duration) -> Option<(u64, Option<AdbDevice>)> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.lock();
        while slot.version == seen {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .shared
                .changed
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slot = guard;
        }
        Some((slot.version, slot.device.clone()))
    }
}
