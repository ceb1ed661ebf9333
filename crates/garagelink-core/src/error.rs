// ── Core error types ──
//
// Errors returned synchronously to the accessory boundary. None of them
// is fatal: the bridge keeps running and the caller decides what to do.
// The `From<garagelink_api::Error>` impl translates link-level failures.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // ── State errors ─────────────────────────────────────────────────
    #[error("No value available: the door state has not been observed yet")]
    NoValueAvailable,

    #[error("Invalid target door state: {value}")]
    InvalidValue { value: String },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Device is not connected and authenticated")]
    NotConnected,

    #[error("Device did not become ready within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Device link error: {message}")]
    Link { message: String },
}

// ── Conversion from link-layer errors ────────────────────────────────

impl From<&garagelink_api::Error> for CoreError {
    fn from(err: &garagelink_api::Error) -> Self {
        match err {
            garagelink_api::Error::AuthRejected { reason } => CoreError::AuthenticationFailed {
                message: reason.clone(),
            },
            garagelink_api::Error::ConnectTimeout { timeout_secs } => CoreError::Timeout {
                timeout_secs: *timeout_secs,
            },
            other => CoreError::Link {
                message: other.to_string(),
            },
        }
    }
}

impl From<garagelink_api::Error> for CoreError {
    fn from(err: garagelink_api::Error) -> Self {
        CoreError::from(&err)
    }
}
