// ── Device session ──
//
// Connectivity snapshot for one device. The link owns it and flips the
// flags; everyone else only reads them.

use std::sync::atomic::{AtomicBool, Ordering};

use secrecy::SecretString;

/// The two secret keys a device requires for its handshake.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: SecretString,
    pub api_secret: SecretString,
}

#[derive(Debug)]
pub struct DeviceSession {
    name: String,
    address: String,
    credentials: Credentials,
    connected: AtomicBool,
    authenticated: AtomicBool,
}

impl DeviceSession {
    pub fn new(name: impl Into<String>, address: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            credentials,
            connected: AtomicBool::new(false),
            authenticated: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Network address in `host:port` form.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub(crate) fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
        if !connected {
            self.authenticated.store(false, Ordering::Release);
        }
    }

    pub(crate) fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::Release);
    }
}
