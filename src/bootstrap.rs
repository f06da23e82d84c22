//! Bootstrap helpers for the wallet broker.
//!
//! Everything the broker keeps on disk lives under `~/.wallet-broker/`:
//! the `.env` file with bootstrap vars (account key, database selection),
//! the optional `config.toml`, and the libSQL permission database.

use std::path::PathBuf;

/// Base directory: `~/.wallet-broker`.
pub fn broker_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wallet-broker")
}

/// Path to the broker-specific `.env` file: `~/.wallet-broker/.env`.
pub fn broker_env_path() -> PathBuf {
    broker_base_dir().join(".env")
}

/// Where a generated caller token is written: `~/.wallet-broker/caller.token`.
pub fn caller_token_path() -> PathBuf {
    broker_base_dir().join("caller.token")
}

/// Load env vars from `./.env` and then `~/.wallet-broker/.env`.
///
/// dotenvy never overwrites existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.wallet-broker/.env`
pub fn load_broker_env() {
    let _ = dotenvy::dotenv();

    let path = broker_env_path();
    if path.exists()
        && let Err(e) = dotenvy::from_path(&path)
    {
        eprintln!("Warning: failed to load {}: {}", path.display(), e);
    }
}
