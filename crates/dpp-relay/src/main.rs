//! # dpp-relay
//!
//! DPP registry relay binary: loads settings, wires the ledger client into
//! the relay and serves until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dpp_ledger::JsonRpcLedgerClient;
use dpp_server::{RelayConfig, RelayServer};
use dpp_settings::RelaySettings;

/// DPP registry event relay.
#[derive(Parser, Debug)]
#[command(name = "dpp-relay", about = "Relays panel registry events to WebSocket clients")]
struct Cli {
    /// Path to a JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings and environment).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings and `PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Ethereum JSON-RPC endpoint (overrides settings and `DPP_RPC_URL`).
    #[arg(long)]
    rpc_url: Option<String>,
}

/// Defaults, then the settings file, then the environment, then CLI flags.
fn resolve_settings(cli: &Cli) -> Result<RelaySettings> {
    let mut settings = dpp_settings::load_settings(cli.config.as_deref())
        .context("Failed to load settings")?;

    if let Some(host) = &cli.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(url) = &cli.rpc_url {
        settings.ledger.rpc_url.clone_from(url);
    }

    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

/// Scheme and authority of `url`, without path or query (which may carry an API key).
fn endpoint_for_log(url: &str) -> &str {
    let start = url.find("://").map_or(0, |i| i + 3);
    match url[start..].find(['/', '?']) {
        Some(end) => &url[..start + end],
        None => url,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    dpp_core::logging::init_subscriber(&settings.logging.level, settings.logging.format);
    let metrics = dpp_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let ledger = JsonRpcLedgerClient::new(
        settings.ledger.rpc_url.clone(),
        &settings.ledger.contract_address,
        Duration::from_millis(settings.ledger.request_timeout_ms),
    )
    .context("Failed to create ledger client")?;

    tracing::info!(
        rpc = endpoint_for_log(&settings.ledger.rpc_url),
        contract = %ledger.contract(),
        "ledger client ready"
    );

    let config = RelayConfig::from(&settings);
    let handle = RelayServer::new(config, Arc::new(ledger), metrics)
        .listen()
        .await
        .context("Failed to start relay")?;

    tracing::info!(addr = %handle.local_addr(), "DPP relay started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down...");
    let clean = handle.shutdown().await;
    tracing::info!(clean, "Shutdown complete");
    Ok(())
}
