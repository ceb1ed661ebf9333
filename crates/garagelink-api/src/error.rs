use thiserror::Error;

/// Top-level error type for the `garagelink-api` crate.
///
/// Covers every failure mode of the device link: connecting, the
/// authentication handshake, frame decoding, and socket I/O.
/// `garagelink-core` maps these into its own error type.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection ──────────────────────────────────────────────────
    /// TCP connect failed (refused, unreachable, DNS failure, etc.)
    #[error("Cannot connect to device at {address}: {reason}")]
    Connect { address: String, reason: String },

    /// TCP connect did not complete in time.
    #[error("Connection to device timed out after {timeout_secs}s")]
    ConnectTimeout { timeout_secs: u64 },

    /// Socket read/write failure on an established session.
    #[error("Device I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link was asked to connect twice.
    #[error("Device link already started")]
    AlreadyStarted,

    // ── Authentication ──────────────────────────────────────────────
    /// The device refused the credentials presented in the handshake.
    #[error("Authentication rejected by device: {reason}")]
    AuthRejected { reason: String },

    // ── Frames ──────────────────────────────────────────────────────
    /// A line from the device could not be decoded into a frame.
    #[error("Malformed frame: {message}")]
    Decode { message: String, line: String },

    /// A frame carried a door state this crate does not know.
    #[error("Unknown door state '{value}'")]
    UnknownState { value: String },

    /// An outbound request could not be serialized.
    #[error("Failed to encode request: {0}")]
    Encode(String),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::ConnectTimeout { .. } | Self::Io(_)
        )
    }
}
