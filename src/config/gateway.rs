use secrecy::SecretString;

use crate::config::helpers::{optional_env, parse_env_or};
use crate::error::ConfigError;
use crate::settings::Settings;

/// HTTP boundary configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token for the approval UI routes (prompts, events, permissions).
    /// Random hex generated at startup if unset.
    pub auth_token: Option<String>,
    /// Bearer token for the caller route (`POST /api/requests`). Random hex
    /// generated at startup and written to `~/.wallet-broker/caller.token` if unset.
    pub caller_token: Option<String>,
}

/// Key material for the active account.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Hex secret key. Required by `serve`.
    pub secret_key: Option<SecretString>,
}

impl GatewayConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let host = optional_env("GATEWAY_HOST")?.unwrap_or_else(|| settings.gateway.host.clone());
        let port = parse_env_or("GATEWAY_PORT", settings.gateway.port).map_err(|e| match e {
            ConfigError::InvalidValue { key, message } => ConfigError::InvalidValue {
                key,
                message: format!("must be a valid port number: {message}"),
            },
            other => other,
        })?;

        let auth_token = optional_env("GATEWAY_AUTH_TOKEN")?;
        let caller_token = optional_env("GATEWAY_CALLER_TOKEN")?;
        if let (Some(ui), Some(caller)) = (&auth_token, &caller_token)
            && ui == caller
        {
            return Err(ConfigError::InvalidValue {
                key: "GATEWAY_CALLER_TOKEN".to_string(),
                message: "must differ from GATEWAY_AUTH_TOKEN".to_string(),
            });
        }

        Ok(Self {
            host,
            port,
            auth_token,
            caller_token,
        })
    }
}

impl AccountConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            secret_key: optional_env("BROKER_ACCOUNT_KEY")?.map(SecretString::from),
        })
    }

    pub fn require_secret_key(&self) -> Result<&SecretString, ConfigError> {
        self.secret_key
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "BROKER_ACCOUNT_KEY".to_string(),
                hint: "Set it in the environment or ~/.wallet-broker/.env".to_string(),
            })
    }
}
