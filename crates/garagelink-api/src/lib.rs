// garagelink-api: Transport adapter for a single networked garage-door controller.

pub mod error;
pub mod event;
pub mod frame;
pub mod link;
pub mod model;
pub mod session;

pub use error::Error;
pub use event::{Lifecycle, ProtocolEvent};
pub use link::{DeviceLink, LinkOptions, ReconnectConfig, TcpLink};
pub use model::{DoorState, KeyType};
pub use session::{Credentials, DeviceSession};
