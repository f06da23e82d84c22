//! Command-line entry points.
//!
//! - `serve`: run the HTTP gateway with the configured account
//! - `preview`: decode a PSBT and print its inputs, outputs and fee
//! - `permissions`: list or pre-grant remembered permissions
//! - `doctor`: check configuration and local prerequisites

pub mod doctor;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::broker::AuthorizationBroker;
use crate::capability::Capability;
use crate::channels::web::{GatewayState, GatewayTokens, start_server};
use crate::config::Config;
use crate::executor::{CapabilityExecutor, LocalKeyring};
use crate::network::Network;
use crate::origin::Origin;
use crate::permissions::PermissionStore;
use crate::prompt::PromptHub;

pub use doctor::run_doctor_command;

#[derive(Parser, Debug)]
#[command(name = "wallet-broker", version, about = "Local wallet authorization broker")]
pub struct Cli {
    /// Path to a TOML config file (defaults to ~/.wallet-broker/config.toml).
    #[arg(long, global = true, env = "BROKER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the authorization gateway.
    Serve,

    /// Decode a PSBT (hex or base64) and print its preview as JSON.
    Preview {
        psbt: String,
        #[arg(long, default_value = "mainnet")]
        network: Network,
    },

    /// Inspect or edit remembered permissions.
    Permissions {
        #[command(subcommand)]
        command: PermissionsCommand,
    },

    /// Check configuration and local prerequisites.
    Doctor {
        /// Exit non-zero when any check fails.
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum PermissionsCommand {
    /// List all remembered grants.
    List,
    /// Remember a grant without prompting.
    Grant { capability: String, origin: String },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config_path = self.config.as_deref();
        match self.command {
            Command::Serve => run_serve(Config::from_env_with_toml(config_path)?).await,
            Command::Preview { psbt, network } => run_preview(&psbt, network),
            Command::Permissions { command } => {
                run_permissions(Config::from_env_with_toml(config_path)?, command).await
            }
            Command::Doctor { strict } => run_doctor_command(config_path, strict).await,
        }
    }
}

async fn run_serve(config: Config) -> anyhow::Result<()> {
    crate::logging::init(config.log_format);

    let backend = crate::db::connect_from_config(&config.database)
        .await
        .context("failed to open permission database")?;
    let permissions = Arc::new(PermissionStore::load(backend).await?);

    let keys = LocalKeyring::from_secret(config.account.require_secret_key()?)?;
    let prompts = Arc::new(PromptHub::new());
    let executor = Arc::new(CapabilityExecutor::new(Arc::new(keys)));
    let broker = Arc::new(AuthorizationBroker::new(
        Arc::clone(&permissions),
        Arc::clone(&prompts) as Arc<dyn crate::prompt::Prompter>,
        executor,
        config.network,
    ));

    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid gateway address {}:{}",
                config.gateway.host, config.gateway.port
            )
        })?;
    let ui_token = config
        .gateway
        .auth_token
        .clone()
        .unwrap_or_else(generate_token);
    let caller_token = match config.gateway.caller_token.clone() {
        Some(token) => token,
        None => write_caller_token(&crate::bootstrap::caller_token_path())?,
    };
    let tokens = GatewayTokens {
        caller: caller_token,
        ui: ui_token.clone(),
    };

    let state = Arc::new(GatewayState::new(broker, prompts, permissions));
    let bound = start_server(addr, Arc::clone(&state), tokens).await?;

    tracing::info!(network = %config.network, "Gateway listening on http://{}", bound);
    println!("Gateway:  http://{bound}");
    println!("UI token: {ui_token}");
    if config.gateway.caller_token.is_none() {
        println!(
            "Caller token written to {}",
            crate::bootstrap::caller_token_path().display()
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    if let Some(tx) = state.shutdown_tx.write().await.take() {
        let _ = tx.send(());
    }
    Ok(())
}

fn generate_token() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

/// Generate a caller token and store it where local callers can read it.
fn write_caller_token(path: &Path) -> anyhow::Result<String> {
    let token = generate_token();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, &token)
        .with_context(|| format!("failed to write caller token to {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict {}", path.display()))?;
    }
    Ok(token)
}

fn run_preview(psbt: &str, network: Network) -> anyhow::Result<()> {
    let preview = crate::psbt::preview(psbt, network)?;
    println!("{}", serde_json::to_string_pretty(&preview)?);
    Ok(())
}

async fn run_permissions(config: Config, command: PermissionsCommand) -> anyhow::Result<()> {
    let backend = crate::db::connect_from_config(&config.database).await?;
    let store = PermissionStore::load(backend).await?;

    match command {
        PermissionsCommand::List => {
            let records = store.list().await;
            if records.is_empty() {
                println!("No remembered permissions.");
            }
            for record in records {
                println!(
                    "{:<16} {:<40} {}",
                    record.capability.as_str(),
                    record.origin,
                    record.created_at.to_rfc3339()
                );
            }
        }
        PermissionsCommand::Grant { capability, origin } => {
            let capability = Capability::parse(&capability)?;
            let origin = Origin::parse(&origin)?;
            store.grant(capability, &origin).await?;
            println!("Granted {} to {}", capability.as_str(), origin);
        }
    }
    Ok(())
}
