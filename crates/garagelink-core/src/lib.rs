// garagelink-core: Door-state reconciliation between garagelink-api and the hub.

pub mod accessory;
pub mod bridge;
pub mod config;
pub mod error;
pub mod reconciler;
pub mod sink;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use accessory::GarageDoor;
pub use bridge::{Bridge, ConnectionState};
pub use config::DeviceConfig;
pub use error::CoreError;
pub use reconciler::Reconciler;
pub use sink::{StateSink, WatchSink};
pub use stream::{DoorStateStream, DoorStateWatchStream};

// Protocol vocabulary, re-exported so consumers need only this crate.
pub use garagelink_api::{DeviceLink, DoorState, KeyType, Lifecycle, ProtocolEvent};
