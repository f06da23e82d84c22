//! Configuration for the wallet broker.
//!
//! Settings are loaded with priority: env var > TOML config file > default.
//! Bootstrap vars (notably `BROKER_ACCOUNT_KEY`) usually live in
//! `~/.wallet-broker/.env`, loaded via dotenvy early in startup.

mod database;
mod gateway;
pub(crate) mod helpers;

use std::path::Path;

use crate::error::ConfigError;
use crate::logging::LogFormat;
use crate::network::Network;
use crate::settings::Settings;

pub use self::database::{DatabaseBackend, DatabaseConfig, default_libsql_path};
pub use self::gateway::{AccountConfig, GatewayConfig};

/// Main configuration for the broker.
#[derive(Debug, Clone)]
pub struct Config {
    pub network: Network,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub account: AccountConfig,
    pub log_format: LogFormat,
}

fn resolve_network(settings: &Settings) -> Result<Network, ConfigError> {
    let (value, key) = match helpers::optional_env("BROKER_NETWORK")? {
        Some(value) => (value, "BROKER_NETWORK"),
        None => (settings.network.clone(), "network"),
    };
    value.parse().map_err(|message| ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    })
}

fn resolve_log_format(settings: &Settings) -> Result<LogFormat, ConfigError> {
    let (value, key) = match helpers::optional_env("BROKER_LOG_FORMAT")? {
        Some(value) => (value, "BROKER_LOG_FORMAT"),
        None => (settings.logging.format.clone(), "logging.format"),
    };
    value.parse().map_err(|message| ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    })
}

impl Config {
    /// Load configuration from env vars and the default TOML file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_toml(None)
    }

    /// Load from env with an optional TOML config file overlay.
    ///
    /// Loads both `./.env` and `~/.wallet-broker/.env` first; dotenvy never
    /// overwrites vars that are already set.
    pub fn from_env_with_toml(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        crate::bootstrap::load_broker_env();
        let mut settings = Settings::default();
        Self::apply_toml_overlay(&mut settings, toml_path)?;
        Self::build(&settings)
    }

    /// Load and merge a TOML config file into settings.
    ///
    /// If `explicit_path` is `Some`, loads from that path (errors are fatal).
    /// If `None`, tries the default path `~/.wallet-broker/config.toml`
    /// (missing file is silently ignored).
    fn apply_toml_overlay(
        settings: &mut Settings,
        explicit_path: Option<&Path>,
    ) -> Result<(), ConfigError> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Settings::default_toml_path);

        match Settings::load_toml(&path) {
            Ok(Some(toml_settings)) => {
                settings.merge_from(&toml_settings);
                tracing::debug!("Loaded TOML config from {}", path.display());
            }
            Ok(None) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
            }
            Err(e) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Failed to load config file {}: {}",
                        path.display(),
                        e
                    )));
                }
                tracing::warn!("Failed to load default config file: {}", e);
            }
        }
        Ok(())
    }

    /// Build config from resolved settings.
    pub fn build(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            network: resolve_network(settings)?,
            database: DatabaseConfig::resolve(settings)?,
            gateway: GatewayConfig::resolve(settings)?,
            account: AccountConfig::resolve()?,
            log_format: resolve_log_format(settings)?,
        })
    }
}
