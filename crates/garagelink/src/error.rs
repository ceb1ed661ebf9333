//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use garagelink_config::ConfigError;
use garagelink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach '{name}': {reason}")]
    #[diagnostic(
        code(garagelink::connection_failed),
        help("Check that the controller is powered on and the address in the config is correct.")
    )]
    ConnectionFailed { name: String, reason: String },

    #[error("'{name}' rejected the configured credentials: {reason}")]
    #[diagnostic(
        code(garagelink::auth_failed),
        help("Verify api_key and api_secret (or the variables named by api_key_env / api_secret_env).")
    )]
    AuthFailed { name: String, reason: String },

    #[error("Timed out after {seconds}s waiting for '{name}'")]
    #[diagnostic(
        code(garagelink::timeout),
        help("Increase the wait with --timeout, or the connect timeout in [defaults].")
    )]
    Timeout { name: String, seconds: u64 },

    // ── Door state ───────────────────────────────────────────────────
    #[error("'{name}' has not reported its state yet")]
    #[diagnostic(code(garagelink::no_value))]
    NoValue { name: String },

    #[error("Invalid door state: {value}")]
    #[diagnostic(code(garagelink::invalid_value))]
    InvalidValue { value: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("No accessory named '{name}'")]
    #[diagnostic(
        code(garagelink::not_found),
        help("Run: garagelink config check to list configured accessories")
    )]
    AccessoryNotFound { name: String },

    #[error("No usable accessories configured")]
    #[diagnostic(
        code(garagelink::no_accessories),
        help(
            "Add at least one [[accessories]] entry with name, address, api_key and api_secret.\n\
             Expected at: {path}"
        )
    )]
    NoAccessories { path: String },

    #[error("Config check failed: {count} invalid accessory entries")]
    #[diagnostic(code(garagelink::invalid_config))]
    InvalidEntries { count: usize },

    #[error(transparent)]
    #[diagnostic(code(garagelink::config))]
    Config(ConfigError),

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::AccessoryNotFound { .. } | Self::NoAccessories { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::InvalidValue { .. } | Self::InvalidEntries { .. } | Self::Config(_) => {
                exit_code::USAGE
            }
            Self::NoValue { .. } | Self::Io(_) => exit_code::GENERAL,
        }
    }

    /// Attach the accessory name to a core error.
    pub fn device(name: &str, err: CoreError) -> Self {
        let name = name.to_owned();
        match err {
            CoreError::NoValueAvailable => CliError::NoValue { name },
            CoreError::InvalidValue { value } => CliError::InvalidValue { value },
            CoreError::NotConnected => CliError::ConnectionFailed {
                name,
                reason: "not connected".into(),
            },
            CoreError::Link { message } => CliError::ConnectionFailed {
                name,
                reason: message,
            },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                name,
                seconds: timeout_secs,
            },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                name,
                reason: message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { name } => CliError::AccessoryNotFound { name },
            other => CliError::Config(other),
        }
    }
}
