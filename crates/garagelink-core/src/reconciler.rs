// ── Door-state reconciliation ──
//
// Turns the device's asynchronous, possibly out-of-order messages into one
// consistent current/target pair, and turns hub target requests into
// device commands. Single-threaded by construction: callers serialize
// access (see `GarageDoor`).

use std::sync::Arc;

use tracing::{debug, info, warn};

use garagelink_api::{DeviceLink, DoorState, KeyType, Lifecycle, ProtocolEvent};

use crate::error::CoreError;
use crate::sink::StateSink;

/// Reconciled state of one door.
///
/// `current` changes only in response to protocol events. `target`
/// changes on hub requests, and is forced to `Closed` whenever the device
/// confirms the door closed.
pub struct Reconciler {
    name: String,
    current: DoorState,
    target: DoorState,
    link: Arc<dyn DeviceLink>,
    sink: Arc<dyn StateSink>,
}

impl Reconciler {
    pub fn new(name: impl Into<String>, link: Arc<dyn DeviceLink>, sink: Arc<dyn StateSink>) -> Self {
        Self {
            name: name.into(),
            current: DoorState::Unknown,
            target: DoorState::Unknown,
            link,
            sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw current state, `Unknown` until observed. Issues no query.
    pub fn current(&self) -> DoorState {
        self.current
    }

    /// Raw target state, `Unknown` until set or derived.
    pub fn target(&self) -> DoorState {
        self.target
    }

    // ── Device side ──────────────────────────────────────────────

    /// Apply one event from the device link.
    pub fn handle_event(&mut self, event: &ProtocolEvent) {
        match event {
            ProtocolEvent::StateChange { state } => {
                debug!(device = %self.name, state = %state, "state change reported");
                self.observe(*state);
                // Closed is the only state backed by a hardware sensor, so it
                // also settles whatever target was pending.
                if *state == DoorState::Closed {
                    self.set_target(DoorState::Closed);
                }
            }

            ProtocolEvent::RelayTrigger { state, key_type } => {
                self.handle_relay(*state, key_type);
            }

            ProtocolEvent::QueryResponse { state } => {
                debug!(device = %self.name, state = %state, "query response");
                self.observe(*state);
            }

            ProtocolEvent::Lifecycle(Lifecycle::Connected) => {
                info!(device = %self.name, "link connected, authenticating");
                self.link.authenticate();
            }

            ProtocolEvent::Lifecycle(Lifecycle::Authenticated) => {
                info!(device = %self.name, "link authenticated");
            }

            // State is retained across drops; reads return the last known value.
            ProtocolEvent::Lifecycle(Lifecycle::Disconnected(reason)) => {
                warn!(device = %self.name, %reason, "link disconnected");
            }

            ProtocolEvent::Lifecycle(Lifecycle::Error(err)) => {
                warn!(device = %self.name, error = %err, "link error");
            }
        }
    }

    /// The relay toggles the door, so the state it fired in tells us where
    /// the door is heading. Only triggers from our own key are trusted.
    fn handle_relay(&mut self, state: DoorState, key_type: &KeyType) {
        if *key_type != KeyType::ApiKey {
            debug!(
                device = %self.name,
                state = %state,
                key_type = %key_type,
                "ignoring relay trigger from foreign key"
            );
            return;
        }

        match state {
            DoorState::Open => self.observe(DoorState::Closing),
            DoorState::Closed => self.observe(DoorState::Opening),
            other => {
                debug!(device = %self.name, state = %other, "relay trigger implies no transition");
            }
        }
    }

    // ── Hub side ─────────────────────────────────────────────────

    /// Cached current state. Always queues a refresh query, whether or
    /// not a value is available, so the next response updates the cache.
    pub fn current_state(&self) -> Result<DoorState, CoreError> {
        self.link.send_query();
        if self.current.is_known() {
            Ok(self.current)
        } else {
            Err(CoreError::NoValueAvailable)
        }
    }

    /// Target state. With no explicit target yet, assumes nothing was
    /// requested and adopts the current state.
    pub fn target_state(&mut self) -> Result<DoorState, CoreError> {
        if self.target.is_known() {
            return Ok(self.target);
        }
        if !self.current.is_known() {
            return Err(CoreError::NoValueAvailable);
        }
        self.set_target(self.current);
        Ok(self.target)
    }

    /// Request a new target state.
    ///
    /// Repeating the current target is a successful no-op, so repeated
    /// hub writes never re-actuate the door.
    pub fn set_target_state(&mut self, requested: DoorState) -> Result<(), CoreError> {
        if !requested.is_known() {
            return Err(CoreError::InvalidValue {
                value: requested.to_string(),
            });
        }

        if requested == self.target {
            debug!(device = %self.name, state = %requested, "target unchanged, no command sent");
            return Ok(());
        }

        if !(self.link.is_connected() && self.link.is_authenticated()) {
            warn!(device = %self.name, state = %requested, "cannot change target while offline");
            return Err(CoreError::NotConnected);
        }

        self.set_target(requested);
        match requested {
            DoorState::Open => self.link.send_open(),
            DoorState::Closed => self.link.send_close(),
            other => {
                info!(device = %self.name, state = %other, "target accepted without a device command");
            }
        }
        Ok(())
    }

    // ── Mutation + push ──────────────────────────────────────────

    fn observe(&mut self, state: DoorState) {
        if !state.is_known() {
            warn!(device = %self.name, "ignoring unknown door state observation");
            return;
        }
        if self.current != state {
            info!(device = %self.name, from = %self.current, to = %state, "current state changed");
            self.current = state;
            self.sink.current_state_changed(state);
        }
    }

    fn set_target(&mut self, state: DoorState) {
        if self.target != state {
            info!(device = %self.name, from = %self.target, to = %state, "target state changed");
            self.target = state;
            self.sink.target_state_changed(state);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
