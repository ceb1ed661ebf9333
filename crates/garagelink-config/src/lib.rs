//! Configuration for the garagelink bridge.
//!
//! TOML accessory list with shared defaults, credential resolution
//! (env indirection + plaintext), and translation to
//! `garagelink_core::DeviceConfig`. The binary layers CLI flags on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use garagelink_core::DeviceConfig;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} for accessory '{accessory}': {reason}")]
    Validation {
        accessory: String,
        field: String,
        reason: String,
    },

    #[error("accessory '{accessory}' has no {field} configured")]
    Missing { accessory: String, field: String },

    #[error("no accessory named '{name}' in the config")]
    NotFound { name: String },

    #[error("config file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Tuning shared by every accessory.
    #[serde(default)]
    pub defaults: Defaults,

    /// One entry per bridged door.
    #[serde(default)]
    pub accessories: Vec<AccessoryEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    /// Connect timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,

    /// Consecutive failed reconnects before giving up. Unset retries forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_max_retries: Option<u32>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            auto_reconnect: default_auto_reconnect(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_secs: default_reconnect_max_secs(),
            reconnect_max_retries: None,
        }
    }
}

fn default_timeout() -> u64 {
    10
}
fn default_auto_reconnect() -> bool {
    true
}
fn default_reconnect_initial_ms() -> u64 {
    1000
}
fn default_reconnect_max_secs() -> u64 {
    30
}

/// One `[[accessories]]` table. Every field is optional at parse time so
/// a single bad entry can be reported without rejecting the whole file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct AccessoryEntry {
    /// Name shown to the hub.
    pub name: Option<String>,

    /// Device address, `host:port`.
    pub address: Option<String>,

    /// First handshake key (plaintext; prefer `api_key_env`).
    pub api_key: Option<String>,

    /// Environment variable holding the first handshake key.
    pub api_key_env: Option<String>,

    /// Second handshake key (plaintext; prefer `api_secret_env`).
    pub api_secret: Option<String>,

    /// Environment variable holding the second handshake key.
    pub api_secret_env: Option<String>,

    /// Override the default connect timeout.
    pub timeout: Option<u64>,

    /// Override the default reconnect behavior.
    pub auto_reconnect: Option<bool>,
}

impl AccessoryEntry {
    /// Name for diagnostics, falling back to the entry's position.
    pub fn label(&self, index: usize) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => format!("accessory #{}", index + 1),
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "garagelink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("garagelink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment.
///
/// An explicit `path` must exist; the platform default may be absent, in
/// which case only defaults and environment apply.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::FileNotFound {
                path: p.to_path_buf(),
            });
        }
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("GARAGELINK_").split("__"));

    let config: Config = figment.extract()?;
    tracing::debug!(
        path = %path.display(),
        accessories = config.accessories.len(),
        "config loaded"
    );
    Ok(config)
}

/// Render the effective config as TOML with every secret masked.
pub fn redacted_toml(cfg: &Config) -> Result<String, ConfigError> {
    let mask = |v: &Option<String>| v.as_ref().map(|_| "********".to_owned());
    let redacted = Config {
        defaults: cfg.defaults.clone(),
        accessories: cfg
            .accessories
            .iter()
            .map(|entry| AccessoryEntry {
                api_key: mask(&entry.api_key),
                api_secret: mask(&entry.api_secret),
                ..entry.clone()
            })
            .collect(),
    };
    Ok(toml::to_string_pretty(&redacted)?)
}

// ── Accessory resolution ────────────────────────────────────────────

/// Resolve one secret: env indirection first, then plaintext.
/// Empty values count as missing.
fn resolve_secret(
    plaintext: Option<&String>,
    env_name: Option<&String>,
    accessory: &str,
    field: &str,
) -> Result<SecretString, ConfigError> {
    if let Some(env_name) = env_name {
        match std::env::var(env_name) {
            Ok(val) if !val.is_empty() => return Ok(SecretString::from(val)),
            _ => {
                tracing::debug!(accessory, env = %env_name, "credential env var unset or empty");
            }
        }
    }

    match plaintext {
        Some(val) if !val.is_empty() => Ok(SecretString::from(val.clone())),
        _ => Err(ConfigError::Missing {
            accessory: accessory.into(),
            field: field.into(),
        }),
    }
}

fn validate_address(address: &str, accessory: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::Validation {
        accessory: accessory.into(),
        field: "address".into(),
        reason: format!("{reason}: '{address}'"),
    };

    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| invalid("expected host:port"))?;
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    match port.parse::<u16>() {
        Ok(p) if p != 0 => Ok(()),
        _ => Err(invalid("invalid port")),
    }
}

/// Build a `DeviceConfig` from one entry plus shared defaults.
pub fn resolve_accessory(
    entry: &AccessoryEntry,
    defaults: &Defaults,
    index: usize,
) -> Result<DeviceConfig, ConfigError> {
    let label = entry.label(index);

    let name = entry
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ConfigError::Missing {
            accessory: label.clone(),
            field: "name".into(),
        })?;

    let address = entry
        .address
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ConfigError::Missing {
            accessory: label.clone(),
            field: "address".into(),
        })?;
    validate_address(address, &label)?;

    let api_key = resolve_secret(
        entry.api_key.as_ref(),
        entry.api_key_env.as_ref(),
        &label,
        "api_key",
    )?;
    let api_secret = resolve_secret(
        entry.api_secret.as_ref(),
        entry.api_secret_env.as_ref(),
        &label,
        "api_secret",
    )?;

    let timeout = entry.timeout.unwrap_or(defaults.timeout);
    if timeout == 0 {
        return Err(ConfigError::Validation {
            accessory: label,
            field: "timeout".into(),
            reason: "must be at least 1 second".into(),
        });
    }

    let mut device = DeviceConfig::new(name, address, api_key, api_secret);
    device.connect_timeout = Duration::from_secs(timeout);
    device.auto_reconnect = entry.auto_reconnect.unwrap_or(defaults.auto_reconnect);
    device.reconnect_initial_delay = Duration::from_millis(defaults.reconnect_initial_ms.max(1));
    device.reconnect_max_delay = Duration::from_secs(defaults.reconnect_max_secs)
        .max(device.reconnect_initial_delay);
    device.reconnect_max_retries = defaults.reconnect_max_retries;
    Ok(device)
}

/// Resolve every entry, keeping failures alongside successes so the
/// caller can skip bad entries and still bridge the rest.
pub fn resolve_accessories(cfg: &Config) -> Vec<Result<DeviceConfig, ConfigError>> {
    let mut seen: Vec<String> = Vec::new();
    cfg.accessories
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let device = resolve_accessory(entry, &cfg.defaults, index)?;
            if seen.iter().any(|n| n.eq_ignore_ascii_case(&device.name)) {
                return Err(ConfigError::Validation {
                    accessory: device.name,
                    field: "name".into(),
                    reason: "duplicate accessory name".into(),
                });
            }
            seen.push(device.name.clone());
            Ok(device)
        })
        .collect()
}

/// Find and resolve a single accessory by name (case-insensitive).
pub fn find_accessory(cfg: &Config, name: &str) -> Result<DeviceConfig, ConfigError> {
    let (index, entry) = cfg
        .accessories
        .iter()
        .enumerate()
        .find(|(_, e)| {
            e.name
                .as_deref()
                .is_some_and(|n| n.trim().eq_ignore_ascii_case(name.trim()))
        })
        .ok_or_else(|| ConfigError::NotFound { name: name.into() })?;
    resolve_accessory(entry, &cfg.defaults, index)
}

// ── Tests ───────────────────────────────────────────────────────────
