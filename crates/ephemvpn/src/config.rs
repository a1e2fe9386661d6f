//! CLI configuration — thin wrapper around `ephemvpn_config`.
//!
//! Adds `--config` handling and the interactive end of credential
//! resolution.

use std::io::{self, IsTerminal};
use std::path::PathBuf;

use secrecy::SecretString;

use ephemvpn_config::ConfigError;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use ephemvpn_config::{Settings, save_settings, store_api_key};

/// `--config` if given, the platform location otherwise.
pub fn settings_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(ephemvpn_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Settings, CliError> {
    let path = settings_path(global);
    tracing::debug!(path = %path.display(), "loading settings");
    Ok(ephemvpn_config::load_settings(Some(path.as_path()))?)
}

/// Argument, then settings/environment, then keyring, then a prompt
/// when stdin is a terminal. `None` when nothing is available and
/// nobody can be asked.
pub fn resolve_credential(
    settings: &Settings,
    explicit: Option<&str>,
) -> Result<Option<SecretString>, CliError> {
    match settings.resolve_api_key(explicit) {
        Ok(secret) => Ok(Some(secret)),
        Err(ConfigError::NoCredentials) if io::stdin().is_terminal() => {
            let key = rpassword::prompt_password("API key: ")?;
            if key.is_empty() {
                return Err(CliError::NoCredentials);
            }
            Ok(Some(SecretString::from(key)))
        }
        Err(ConfigError::NoCredentials) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
