//! File-backed settings (`~/.wallet-broker/config.toml`).
//!
//! Settings are the middle layer of configuration: env vars override them,
//! and they override built-in defaults. See `crate::config` for resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Network transaction payloads are interpreted against.
    pub network: String,
    pub database: DatabaseSettings,
    pub gateway: GatewaySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// `libsql` or `memory`.
    pub backend: String,
    pub libsql_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            network: "mainnet".to_string(),
            database: DatabaseSettings::default(),
            gateway: GatewaySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: "libsql".to_string(),
            libsql_path: None,
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3710,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
        }
    }
}

impl Settings {
    /// Default TOML config file path (~/.wallet-broker/config.toml).
    pub fn default_toml_path() -> PathBuf {
        crate::bootstrap::broker_base_dir().join("config.toml")
    }

    /// Load settings from a TOML file.
    ///
    /// Returns `None` if the file doesn't exist. Returns an error only
    /// if the file exists but can't be parsed.
    pub fn load_toml(path: &Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };

        toml::from_str(&data)
            .map(Some)
            .map_err(|e| format!("invalid TOML in {}: {}", path.display(), e))
    }

    /// Merge values from `other` into `self`, preferring `other` for any
    /// field that differs from the default.
    pub fn merge_from(&mut self, other: &Self) {
        let (Ok(default_json), Ok(other_json), Ok(mut self_json)) = (
            serde_json::to_value(Self::default()),
            serde_json::to_value(other),
            serde_json::to_value(&*self),
        ) else {
            return;
        };

        merge_non_default(&mut self_json, &other_json, &default_json);

        if let Ok(merged) = serde_json::from_value(self_json) {
            *self = merged;
        }
    }
}

fn merge_non_default(
    target: &mut serde_json::Value,
    other: &serde_json::Value,
    defaults: &serde_json::Value,
) {
    match (target, other, defaults) {
        (
            serde_json::Value::Object(t),
            serde_json::Value::Object(o),
            serde_json::Value::Object(d),
        ) => {
            for (key, other_val) in o {
                let default_val = d.get(key).cloned().unwrap_or(serde_json::Value::Null);
                if let Some(target_val) = t.get_mut(key) {
                    merge_non_default(target_val, other_val, &default_val);
                } else if other_val != &default_val {
                    t.insert(key.clone(), other_val.clone());
                }
            }
        }
        (target, other, defaults) => {
            if other != defaults {
                *target = other.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "network = \"regtest\"\n\n[gateway]\nport = 4000\n").unwrap();

        let loaded = Settings::load_toml(&path).unwrap().unwrap();
        assert_eq!(loaded.network, "regtest");
        assert_eq!(loaded.gateway.port, 4000);
        assert_eq!(loaded.gateway.host, "127.0.0.1");
        assert_eq!(loaded.database.backend, "libsql");
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Settings::load_toml(&dir.path().join("absent.toml")), Ok(None));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "network = [").unwrap();
        assert!(Settings::load_toml(&path).is_err());
    }

    #[test]
    fn merge_prefers_non_default_values() {
        let mut base = Settings {
            network: "signet".to_string(),
            ..Default::default()
        };
        let overlay = Settings {
            logging: LoggingSettings {
                format: "json".to_string(),
            },
            ..Default::default()
        };

        base.merge_from(&overlay);
        assert_eq!(base.network, "signet");
        assert_eq!(base.logging.format, "json");
    }
}
