//! Shared configuration for Powerbrain tools.
//!
//! TOML profiles (one per appliance), config-version migration, password
//! resolution (env + keyring + plaintext) and translation to
//! `powerbrain_core::ApplianceConfig`.

use std::collections::HashMap;
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
use tracing::{debug, info};

use powerbrain_core::{ApplianceConfig, DEFAULT_SCAN_INTERVAL, TlsVerification};

/// Config layout version written by this release.
pub const CURRENT_VERSION: u32 = 2;

/// Keyring service name for stored appliance passwords.
pub const KEYRING_SERVICE: &str = "powerbrain";

/// Generic password variable, consulted after a profile's `password_env`.
pub const PASSWORD_ENV: &str = "POWERBRAIN_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("config version {found} is newer than supported version {}", CURRENT_VERSION)]
    UnsupportedVersion { found: u32 },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Layout version. Files without one predate credentials (version 1).
    #[serde(default = "legacy_version")]
    pub version: u32,

    /// Profile used when none is named on the command line.
    #[serde(default)]
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named appliance profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile, falling back to `default_profile` when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

fn legacy_version() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Poll interval in seconds.
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            scan_interval: default_scan_interval(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    5
}
fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL.as_secs()
}

/// One appliance.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Appliance base URL or bare host (e.g. "192.168.1.50").
    pub host: String,

    pub username: Option<String>,

    /// Password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// Poll interval in seconds, as entered at setup.
    pub scan_interval: Option<u64>,

    /// Skip TLS verification (for HTTPS reverse proxies).
    pub insecure: Option<bool>,

    /// Request timeout in seconds.
    pub timeout: Option<u64>,

    /// Settings changed after setup. Take precedence over the fields above.
    #[serde(default, skip_serializing_if = "ProfileOptions::is_empty")]
    pub options: ProfileOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProfileOptions {
    pub scan_interval: Option<u64>,
}

impl ProfileOptions {
    pub fn is_empty(&self) -> bool {
        self.scan_interval.is_none()
    }
}

impl Profile {
    /// Effective poll interval: options, then the profile, then `defaults`.
    pub fn effective_scan_interval(&self, defaults: &Defaults) -> Duration {
        let secs = self
            .options
            .scan_interval
            .or(self.scan_interval)
            .unwrap_or(defaults.scan_interval);
        Duration::from_secs(secs)
    }

    /// Parse `host` into a URL. Bare hosts get `http://`.
    pub fn url(&self) -> Result<url::Url, ConfigError> {
        let raw = self.host.trim();
        let candidate = if raw.contains("://") {
            raw.to_owned()
        } else {
            format!("http://{raw}")
        };
        match url::Url::parse(&candidate) {
            Ok(url) if url.host_str().is_some_and(|h| !h.is_empty()) => Ok(url),
            _ => Err(ConfigError::Validation {
                field: "host".into(),
                reason: format!("invalid appliance address: {}", self.host),
            }),
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "powerbrain", "powerbrain").map_or_else(
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
    p.push("powerbrain");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from the canonical path.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load and migrate the config at `path`, layered with `POWERBRAIN_*`
/// environment variables (`__` separates nested keys). A missing file
/// yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    load_migrated(path).map(|(config, _)| config)
}

/// Like [`load_config_from`], also reporting whether an existing file was
/// migrated and should be written back.
pub fn load_migrated(path: &Path) -> Result<(Config, bool), ConfigError> {
    let mut config: Config = figment_for(path).extract()?;
    if config.version > CURRENT_VERSION {
        return Err(ConfigError::UnsupportedVersion {
            found: config.version,
        });
    }
    if !path.exists() {
        config.version = CURRENT_VERSION;
    }
    let migrated = migrate(&mut config);
    debug!(path = %path.display(), profiles = config.profiles.len(), "config loaded");
    Ok((config, migrated))
}

fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::default("defaults", Defaults::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("POWERBRAIN_").split("__"))
}

/// Load config, returning a default if it can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Migration ───────────────────────────────────────────────────────

/// Bring `config` up to [`CURRENT_VERSION`]. Returns whether anything changed.
///
/// Version 1 profiles carried no credentials; version 2 gives them user
/// `admin` and an empty password.
pub fn migrate(config: &mut Config) -> bool {
    if config.version >= CURRENT_VERSION {
        return false;
    }
    if config.version == 1 {
        for (name, profile) in &mut config.profiles {
            profile.username.get_or_insert_with(|| "admin".into());
            profile.password.get_or_insert_with(String::new);
            debug!(profile = %name, "profile migrated to version 2");
        }
    }
    info!(from = config.version, to = CURRENT_VERSION, "config migrated");
    config.version = CURRENT_VERSION;
    true
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the appliance password.
///
/// Order: the profile's `password_env` variable, `POWERBRAIN_PASSWORD`,
/// the system keyring (`powerbrain` / `{profile}/password`), then the
/// plaintext value. An appliance without a password is valid, so the
/// chain ends in an empty secret.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> SecretString {
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return SecretString::from(val);
        }
    }

    if let Ok(val) = std::env::var(PASSWORD_ENV) {
        return SecretString::from(val);
    }

    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
        if let Ok(pw) = entry.get_password() {
            return SecretString::from(pw);
        }
    }

    SecretString::from(profile.password.clone().unwrap_or_default())
}

/// Store a password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| ConfigError::Validation {
            field: "password".into(),
            reason: format!("keyring: {e}"),
        })
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/password")
}

/// Build an `ApplianceConfig` from a profile without CLI overrides.
pub fn profile_to_appliance_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ApplianceConfig, ConfigError> {
    let mut config = ApplianceConfig::new(profile.url()?);
    if let Some(ref username) = profile.username {
        config.username.clone_from(username);
    }
    config.password = resolve_password(profile, profile_name);
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.scan_interval = profile.effective_scan_interval(defaults);
    config.tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else {
        TlsVerification::SystemDefaults
    };
    Ok(config)
}
