//! `wallet-broker doctor` - active health diagnostics.
//!
//! Validates configuration and probes local prerequisites so problems
//! surface before `serve` is started. Each check reports pass/fail with
//! guidance on failures.

use std::path::Path;

use crate::config::{Config, DatabaseBackend};
use crate::executor::{AccountKeys, LocalKeyring};

/// Run diagnostic checks and print results.
pub async fn run_doctor_command(config_path: Option<&Path>, strict: bool) -> anyhow::Result<()> {
    println!("Wallet Broker Doctor");
    println!("====================\n");

    let mut passed = 0u32;
    let mut failed = 0u32;

    let config = match Config::from_env_with_toml(config_path) {
        Ok(config) => {
            check(
                "Configuration",
                CheckResult::Pass(format!("network {}", config.network)),
                &mut passed,
                &mut failed,
            );
            Some(config)
        }
        Err(e) => {
            check(
                "Configuration",
                CheckResult::Fail(e.to_string()),
                &mut passed,
                &mut failed,
            );
            None
        }
    };

    match &config {
        Some(config) => {
            check(
                "Account key",
                check_account_key(config),
                &mut passed,
                &mut failed,
            );
            check(
                "Permission database",
                check_database(config).await,
                &mut passed,
                &mut failed,
            );
            check(
                "Gateway bind port",
                check_gateway_port_available(&config.gateway.host, config.gateway.port),
                &mut passed,
                &mut failed,
            );
        }
        None => {
            for name in ["Account key", "Permission database", "Gateway bind port"] {
                check(
                    name,
                    CheckResult::Skip("configuration did not load".to_string()),
                    &mut passed,
                    &mut failed,
                );
            }
        }
    }

    println!();
    println!("  {passed} passed, {failed} failed");

    if failed > 0 {
        println!("\n  Fix the listed checks before running `wallet-broker serve`.");
        if strict {
            anyhow::bail!("doctor strict mode failed with {failed} check(s)");
        }
    }

    Ok(())
}

fn check(name: &str, result: CheckResult, passed: &mut u32, failed: &mut u32) {
    match result {
        CheckResult::Pass(detail) => {
            *passed += 1;
            println!("  [pass] {name}: {detail}");
        }
        CheckResult::Fail(detail) => {
            *failed += 1;
            println!("  [FAIL] {name}: {detail}");
        }
        CheckResult::Skip(reason) => {
            println!("  [skip] {name}: {reason}");
        }
    }
}

enum CheckResult {
    Pass(String),
    Fail(String),
    Skip(String),
}

fn check_account_key(config: &Config) -> CheckResult {
    let secret = match config.account.require_secret_key() {
        Ok(secret) => secret,
        Err(e) => return CheckResult::Fail(e.to_string()),
    };
    match LocalKeyring::from_secret(secret) {
        Ok(keys) => CheckResult::Pass(format!("public key {}", keys.public_key())),
        Err(e) => CheckResult::Fail(format!("BROKER_ACCOUNT_KEY is unusable: {e}")),
    }
}

async fn check_database(config: &Config) -> CheckResult {
    match config.database.backend {
        DatabaseBackend::Memory => {
            CheckResult::Pass("in-memory store (grants are lost on restart)".to_string())
        }
        DatabaseBackend::LibSql => {
            let path = &config.database.libsql_path;
            let existed = path.exists();
            match crate::db::connect_from_config(&config.database).await {
                Ok(_) if existed => {
                    CheckResult::Pass(format!("libSQL database opened ({})", path.display()))
                }
                Ok(_) => CheckResult::Pass(format!("libSQL database created ({})", path.display())),
                Err(e) => CheckResult::Fail(format!(
                    "cannot open libSQL database at {}: {e}",
                    path.display()
                )),
            }
        }
    }
}

fn check_gateway_port_available(host: &str, port: u16) -> CheckResult {
    let bind_addr = format!("{host}:{port}");
    match std::net::TcpListener::bind(&bind_addr) {
        Ok(listener) => {
            drop(listener);
            CheckResult::Pass(format!("{bind_addr} is available"))
        }
        Err(error) => CheckResult::Fail(format!(
            "{bind_addr} is unavailable ({error}); free the port or change GATEWAY_PORT"
        )),
    }
}
