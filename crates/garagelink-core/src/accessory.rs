// ── Garage door accessory ──
//
// The hub-facing handle for one device. Device events and hub requests
// arrive on different tasks; both go through the same per-device mutex.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use garagelink_api::{DeviceLink, DoorState, ProtocolEvent};

use crate::error::CoreError;
use crate::reconciler::Reconciler;
use crate::sink::StateSink;

/// Cheaply cloneable handle to one door's reconciled state.
#[derive(Clone)]
pub struct GarageDoor {
    inner: Arc<GarageDoorInner>,
}

struct GarageDoorInner {
    name: String,
    reconciler: Mutex<Reconciler>,
}

impl GarageDoor {
    /// Wrap a device link. The link handle is owned by this door; nothing
    /// else issues commands through it on the door's behalf.
    pub fn new(name: impl Into<String>, link: Arc<dyn DeviceLink>, sink: Arc<dyn StateSink>) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new(GarageDoorInner {
                reconciler: Mutex::new(Reconciler::new(name.clone(), link, sink)),
                name,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Feed one event from the device link.
    pub fn handle_event(&self, event: &ProtocolEvent) {
        self.lock().handle_event(event);
    }

    /// Last known door state. Queues a refresh query on every call.
    pub fn get_current_state(&self) -> Result<DoorState, CoreError> {
        self.lock().current_state()
    }

    pub fn get_target_state(&self) -> Result<DoorState, CoreError> {
        self.lock().target_state()
    }

    pub fn set_target_state(&self, requested: DoorState) -> Result<(), CoreError> {
        self.lock().set_target_state(requested)
    }

    /// The hardware has no obstruction sensor.
    pub fn obstruction_detected(&self) -> bool {
        false
    }

    pub fn identify(&self) {
        info!(device = %self.inner.name, "identify requested");
    }

    fn lock(&self) -> MutexGuard<'_, Reconciler> {
        self.inner
            .reconciler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for GarageDoor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rec = self.lock();
        f.debug_struct("GarageDoor")
            .field("name", &self.inner.name)
            .field("current", &rec.current())
            .field("target", &rec.target())
            .finish()
    }
}
