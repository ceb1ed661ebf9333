// ── Runtime device configuration ──
//
// Describes *how* to reach one garage-door controller. Carries secret
// material and connection tuning but never touches disk: the config crate
// or the binary builds a `DeviceConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;

/// Configuration for bridging a single device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Accessory name shown to the hub and used in logs.
    pub name: String,
    /// Device address, `host:port`.
    pub address: String,
    /// First handshake key.
    pub api_key: SecretString,
    /// Second handshake key.
    pub api_secret: SecretString,
    /// Bound on a single connect attempt, also used for readiness waits.
    pub connect_timeout: Duration,
    /// Keep reconnecting after the connection drops.
    pub auto_reconnect: bool,
    /// Delay before the first reconnect attempt.
    pub reconnect_initial_delay: Duration,
    /// Upper bound on reconnect backoff.
    pub reconnect_max_delay: Duration,
    /// Give up after this many consecutive failed reconnects. `None` retries forever.
    pub reconnect_max_retries: Option<u32>,
}

impl DeviceConfig {
    /// A config with default tuning for the given device.
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        api_key: SecretString,
        api_secret: SecretString,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            api_key,
            api_secret,
            connect_timeout: Duration::from_secs(10),
            auto_reconnect: true,
            reconnect_initial_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            reconnect_max_retries: None,
        }
    }
}
