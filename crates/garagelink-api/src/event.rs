// ── Protocol events ──
//
// Everything the link hands upward: decoded device notifications,
// query responses, and connection lifecycle signals. One closed enum,
// matched exhaustively by consumers.

use std::sync::Arc;

use crate::error::Error;
use crate::model::{DoorState, KeyType};

/// A single message from the device link, in arrival order.
#[derive(Debug, Clone)]
pub enum ProtocolEvent {
    /// The device reports a new door state on its own.
    StateChange { state: DoorState },

    /// The door relay fired. `state` is the door state at the moment the
    /// relay triggered, not the state it is heading to.
    RelayTrigger { state: DoorState, key_type: KeyType },

    /// Answer to an explicit query.
    QueryResponse { state: DoorState },

    /// Connection lifecycle signal.
    Lifecycle(Lifecycle),
}

#[derive(Debug, Clone)]
pub enum Lifecycle {
    Connected,
    Authenticated,
    Disconnected(String),
    Error(Arc<Error>),
}

impl From<Lifecycle> for ProtocolEvent {
    fn from(signal: Lifecycle) -> Self {
        Self::Lifecycle(signal)
    }
}
