use std::path::PathBuf;

use crate::config::helpers::{normalize_variant, optional_env};
use crate::error::ConfigError;
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    /// Process-local; grants are lost on restart.
    Memory,
    LibSql,
}

impl DatabaseBackend {
    fn parse(value: &str, key: &str) -> Result<Self, ConfigError> {
        match normalize_variant(value).as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "libsql" | "sqlite" | "turso" => Ok(Self::LibSql),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected 'libsql' or 'memory', got '{value}'"),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub libsql_path: PathBuf,
}

/// Default permission database: `~/.wallet-broker/permissions.db`.
pub fn default_libsql_path() -> PathBuf {
    crate::bootstrap::broker_base_dir().join("permissions.db")
}

impl DatabaseConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let backend = match optional_env("DATABASE_BACKEND")? {
            Some(value) => DatabaseBackend::parse(&value, "DATABASE_BACKEND")?,
            None => DatabaseBackend::parse(&settings.database.backend, "database.backend")?,
        };

        let libsql_path = optional_env("LIBSQL_PATH")?
            .or_else(|| settings.database.libsql_path.clone())
            .map(PathBuf::from)
            .unwrap_or_else(default_libsql_path);

        Ok(Self {
            backend,
            libsql_path,
        })
    }
}
