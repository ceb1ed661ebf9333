// ── Door domain types ──

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Physical condition of the garage door.
///
/// `Unknown` is the sentinel held before anything has been observed.
/// It never appears on the wire and is never pushed to consumers as a
/// valid state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DoorState {
    Open,
    Closed,
    Opening,
    Closing,
    Stopped,
    Unknown,
}

impl DoorState {
    /// Parse a wire state string. Returns `None` for anything outside the
    /// observable set, including the literal `"unknown"`.
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim().parse::<Self>() {
            Ok(Self::Unknown) | Err(_) => None,
            Ok(state) => Some(state),
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

/// The kind of key that fired the door relay.
///
/// Only `ApiKey` triggers are attributable to this integration. Anything
/// else (handheld remote, keypad, wall button) is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyType {
    ApiKey,
    Other(String),
}

impl KeyType {
    const API_KEY: &'static str = "api key";

    pub fn as_str(&self) -> &str {
        match self {
            Self::ApiKey => Self::API_KEY,
            Self::Other(raw) => raw,
        }
    }
}

impl From<&str> for KeyType {
    fn from(raw: &str) -> Self {
        if raw == Self::API_KEY {
            Self::ApiKey
        } else {
            Self::Other(raw.to_owned())
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
