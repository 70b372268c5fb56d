//! Daemon configuration.
//!
//! Configuration is read once at startup and never changes afterwards.
//! Sources, lowest precedence first:
//!
//! 1. A TOML file (`--config PATH`, else `$XDG_CONFIG_HOME/lockwatch/config.toml`
//!    when it exists)
//! 2. Environment variables
//!
//! ```toml
//! [sesame]
//! api_key = "..."
//! device_ids = ["11200416-...", "5a0e7c3b-..."]
//! secrets = ["0102...0f10", "a1b2...e5f6"]
//! names = ["Front door", "Back door"]
//!
//! [discord]
//! bot_token = "..."
//! channel_id = 123456789012345678
//! mention = "@here"
//!
//! [monitor]
//! interval_secs = 60
//! request_timeout_secs = 10
//! ```
//!
//! Any validation failure is fatal: the daemon exits before the monitor
//! loop starts.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lockwatch_core::{Device, DeviceSecret};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

// ============================================================================
// Constants
// ============================================================================

/// Default seconds between poll cycles.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default per-call timeout for device API requests.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Environment variable names.
pub mod env_keys {
    pub const API_KEY: &str = "SESAME_API_KEY";
    pub const API_BASE_URL: &str = "SESAME_API_BASE_URL";
    pub const DEVICE_IDS: &str = "SESAME_DEVICE_IDS";
    pub const SECRETS: &str = "SESAME_SECRETS";
    pub const DEVICE_NAMES: &str = "SESAME_DEVICE_NAMES";
    pub const BOT_TOKEN: &str = "DISCORD_BOT_TOKEN";
    pub const CHANNEL_ID: &str = "DISCORD_CHANNEL_ID";
    pub const MENTION: &str = "DISCORD_MENTION_ON_UPDATE";
    pub const INTERVAL: &str = "CHECK_INTERVAL_SECONDS";
    pub const REQUEST_TIMEOUT: &str = "LOCKWATCH_REQUEST_TIMEOUT_SECONDS";
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read {path}: {error}")]
    Io { path: PathBuf, error: String },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse {path}: {error}")]
    Parse { path: PathBuf, error: String },

    /// One or more required settings are absent or still placeholders.
    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    /// A numeric setting is not a number.
    #[error("{key} must be a number, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    /// Poll interval of zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// Device id and secret lists differ in length.
    #[error("{ids} device ids but {secrets} secrets; the lists must match")]
    CountMismatch { ids: usize, secrets: usize },

    /// A device secret is malformed.
    #[error("secret for device {device} is invalid: {reason}")]
    InvalidSecret { device: String, reason: String },

    /// The same device id is listed more than once.
    #[error("device {0} is listed more than once")]
    DuplicateDevice(String),
}

// ============================================================================
// Raw (unvalidated) configuration
// ============================================================================

/// Unvalidated settings as read from file and environment.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub sesame: RawSesame,
    pub discord: RawDiscord,
    pub monitor: RawMonitor,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawSesame {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub device_ids: Vec<String>,
    pub secrets: Vec<String>,
    pub names: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawDiscord {
    pub bot_token: Option<String>,
    pub channel_id: Option<u64>,
    pub mention: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawMonitor {
    pub interval_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl RawConfig {
    /// Parses a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml(&text).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Parses TOML text.
    pub fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }

    /// Overlays values from an environment lookup.
    ///
    /// Blank variables are treated as unset. Lists are comma separated.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(env_keys::API_KEY) {
            self.sesame.api_key = Some(v);
        }
        if let Some(v) = get(env_keys::API_BASE_URL) {
            self.sesame.base_url = Some(v.trim().to_string());
        }
        if let Some(v) = get(env_keys::DEVICE_IDS) {
            self.sesame.device_ids = split_list(&v);
        }
        if let Some(v) = get(env_keys::SECRETS) {
            self.sesame.secrets = split_list(&v);
        }
        if let Some(v) = get(env_keys::DEVICE_NAMES) {
            self.sesame.names = split_list(&v);
        }
        if let Some(v) = get(env_keys::BOT_TOKEN) {
            self.discord.bot_token = Some(v.trim().to_string());
        }
        if let Some(v) = get(env_keys::CHANNEL_ID) {
            self.discord.channel_id = Some(parse_number(env_keys::CHANNEL_ID, &v)?);
        }
        if let Some(v) = get(env_keys::MENTION) {
            self.discord.mention = Some(v.trim().to_string());
        }
        if let Some(v) = get(env_keys::INTERVAL) {
            self.monitor.interval_secs = Some(parse_number(env_keys::INTERVAL, &v)?);
        }
        if let Some(v) = get(env_keys::REQUEST_TIMEOUT) {
            self.monitor.request_timeout_secs = Some(parse_number(env_keys::REQUEST_TIMEOUT, &v)?);
        }
        Ok(())
    }

    /// Validates and converts into a [`Config`].
    pub fn validate(self) -> Result<Config, ConfigError> {
        let mut missing = Vec::new();

        let api_key = self.sesame.api_key.as_deref().map(sanitize_api_key);
        let api_key = match api_key {
            Some(k) if !k.is_empty() && !is_placeholder(&k) => k,
            _ => {
                missing.push(env_keys::API_KEY);
                String::new()
            }
        };

        let ids = self.sesame.device_ids;
        if ids.is_empty() || ids.iter().any(|id| id.is_empty() || is_placeholder(id)) {
            missing.push(env_keys::DEVICE_IDS);
        }
        if self.sesame.secrets.is_empty() {
            missing.push(env_keys::SECRETS);
        }

        let bot_token = match self.discord.bot_token {
            Some(t) if !t.is_empty() && !is_placeholder(&t) => t,
            _ => {
                missing.push(env_keys::BOT_TOKEN);
                String::new()
            }
        };

        let channel_id = self.discord.channel_id.unwrap_or(0);
        if channel_id == 0 {
            missing.push(env_keys::CHANNEL_ID);
        }

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        if ids.len() != self.sesame.secrets.len() {
            return Err(ConfigError::CountMismatch {
                ids: ids.len(),
                secrets: self.sesame.secrets.len(),
            });
        }

        let mut seen = HashSet::with_capacity(ids.len());
        if let Some(dup) = ids.iter().find(|id| !seen.insert(id.to_ascii_lowercase())) {
            return Err(ConfigError::DuplicateDevice(dup.clone()));
        }

        let mut names = self.sesame.names.into_iter();
        let mut devices = Vec::with_capacity(ids.len());
        for (id, secret) in ids.into_iter().zip(self.sesame.secrets) {
            let secret = DeviceSecret::parse(&secret).map_err(|e| ConfigError::InvalidSecret {
                device: id.clone(),
                reason: e.to_string(),
            })?;
            let mut device = Device::new(id, secret);
            if let Some(name) = names.next() {
                device = device.with_name(name);
            }
            devices.push(device);
        }

        let interval_secs = self.monitor.interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if interval_secs == 0 {
            return Err(ConfigError::Zero(env_keys::INTERVAL));
        }
        let timeout_secs = self
            .monitor
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::Zero(env_keys::REQUEST_TIMEOUT));
        }

        Ok(Config {
            api_key,
            api_base_url: self.sesame.base_url,
            devices,
            bot_token,
            channel_id,
            mention: self.discord.mention.filter(|m| !m.trim().is_empty()),
            poll_interval: Duration::from_secs(interval_secs),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

// ============================================================================
// Validated configuration
// ============================================================================

/// Validated daemon configuration.
#[derive(Clone)]
pub struct Config {
    /// Cloud API key
    pub api_key: String,

    /// Cloud API base URL override
    pub api_base_url: Option<String>,

    /// Fleet, in configured order
    pub devices: Vec<Device>,

    /// Chat bot token
    pub bot_token: String,

    /// Destination channel for alerts
    pub channel_id: u64,

    /// Appended to every alert when set
    pub mention: Option<String>,

    /// Time between poll cycles
    pub poll_interval: Duration,

    /// Timeout for each device API call
    pub request_timeout: Duration,
}

impl Config {
    /// Loads configuration from file (if any) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut raw = match path {
            Some(p) => RawConfig::from_file(p)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(p) => RawConfig::from_file(&p)?,
                None => {
                    debug!("No config file, using environment only");
                    RawConfig::default()
                }
            },
        };

        raw.apply_env(|key| std::env::var(key).ok())?;
        let config = raw.validate()?;

        info!(
            devices = config.devices.len(),
            interval_secs = config.poll_interval.as_secs(),
            "Configuration loaded"
        );
        Ok(config)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("devices", &self.devices)
            .field("bot_token", &"<redacted>")
            .field("channel_id", &self.channel_id)
            .field("mention", &self.mention)
            .field("poll_interval", &self.poll_interval)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Returns `$XDG_CONFIG_HOME/lockwatch/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lockwatch").join("config.toml"))
}

// ============================================================================
// Helpers
// ============================================================================

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(|s| s.trim().to_string()).collect()
}

fn parse_number(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key,
        value: value.to_string(),
    })
}

/// Drops invisible non-ASCII characters pasted along with the key.
fn sanitize_api_key(key: &str) -> String {
    key.chars()
        .filter(char::is_ascii)
        .collect::<String>()
        .trim()
        .to_string()
}

fn is_placeholder(value: &str) -> bool {
    value.trim().starts_with("YOUR_")
}
