//! CLI configuration: thin wrapper around `powerbrain_config`.
//!
//! Adds resolution that respects `GlobalOpts` overrides (--host,
//! --username, --password, ...).

use std::time::Duration;

use secrecy::SecretString;
use tracing::{debug, warn};

use powerbrain_core::{ApplianceConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use powerbrain_config::{Config, Profile, config_path, load_config_or_default, save_config};

/// Load the config file; a file that was migrated is written back.
pub fn load_and_migrate() -> Result<Config, CliError> {
    let path = config_path();
    let (config, migrated) = powerbrain_config::load_migrated(&path)?;
    if migrated {
        if let Err(e) = save_config(&config) {
            warn!(error = %e, "could not persist migrated config");
        }
    }
    Ok(config)
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Comma-separated profile names for help text.
pub fn available_profiles(config: &Config) -> String {
    let mut names: Vec<_> = config.profiles.keys().cloned().collect();
    names.sort();
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}

/// Build the `ApplianceConfig` for this invocation.
///
/// A configured profile is used with flag overrides; without one, `--host`
/// alone is enough.
pub fn build_appliance_config(global: &GlobalOpts) -> Result<ApplianceConfig, CliError> {
    let cfg = load_and_migrate()?;
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        debug!(profile = %profile_name, "using configured profile");
        return resolve_profile(profile, &profile_name, &cfg, global);
    }

    if global.profile.is_some() {
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: available_profiles(&cfg),
        });
    }

    let Some(host) = global.host.clone() else {
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    };

    let adhoc = Profile {
        host,
        ..Profile::default()
    };
    resolve_profile(&adhoc, &profile_name, &cfg, global)
}

/// Translate a `Profile` + global flags into an `ApplianceConfig`.
///
/// CLI flags take priority over profile values.
pub fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<ApplianceConfig, CliError> {
    let mut profile = profile.clone();
    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }

    let mut config =
        powerbrain_config::profile_to_appliance_config(&profile, profile_name, &cfg.defaults)?;

    if let Some(ref username) = global.username {
        config.username.clone_from(username);
    }
    if let Some(ref password) = global.password {
        config.password = SecretString::from(password.clone());
    }
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    Ok(config)
}
