//! permchain node entry point.

use anyhow::Context;
use clap::Parser;
use permchain_ledger::{InMemoryLedger, Ledger};
use permchain_miner::new_miner_master;
use permchain_p2p::{Broadcaster, HttpTransport};
use std::path::PathBuf;
use std::sync::Arc;

mod config;
mod rpc;

#[derive(Parser)]
#[command(name = "permchain-server")]
#[command(about = "A permissioned-network mining node", long_about = None)]
struct Cli {
    /// Path to the network config file.
    #[arg(long)]
    config: PathBuf,

    /// This node's id in the config roster.
    #[arg(long)]
    id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = config::ServerConfig::load(&cli.config, &cli.id)
        .context("failed to load configuration")?;
    config.log_summary();

    let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new(config.ledger_config()));
    let transport = Arc::new(
        HttpTransport::new(config.push_timeout()).context("failed to build peer transport")?,
    );
    let broadcaster = Arc::new(Broadcaster::new(
        config.peer_addrs(),
        config.p2p_config(),
        transport,
    ));

    let master = new_miner_master(
        &config.miner.variant,
        config.miner_config(),
        ledger,
        broadcaster,
    )
    .context("failed to build mining master")?;

    // The worker pool must be live before the listener accepts traffic.
    Arc::clone(&master).start();

    let app = rpc::router(master);
    let listener = tokio::net::TcpListener::bind(&config.self_node.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.self_node.addr))?;
    tracing::info!(addr = %config.self_node.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
