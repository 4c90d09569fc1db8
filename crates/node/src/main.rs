//! BFT Ledger Node
//!
//! Runs the application side of a BFT-replicated account ledger. The
//! consensus engine drives the block lifecycle over the HTTP JSON-RPC
//! endpoint; local clients submit transactions there too and get them
//! forwarded to the consensus engine. State is persisted to disk and
//! survives restarts.

use anyhow::{Context, Result};
use bft_app::{Application, RpcConsensusClient, SubmissionBridge};
use bft_ledger::{Genesis, Ledger, LedgerConfig};
use bft_types::TransactionCodec;
use clap::Parser;
use parking_lot::Mutex;
use rpc_server::{HttpRpcServer, RpcContext, SubscriptionManager, WebSocketServer};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::NodeConfig;

/// BFT ledger application node
#[derive(Parser, Debug)]
#[command(name = "bft-node")]
#[command(about = "Account ledger application for a BFT consensus engine", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for persistent state
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Genesis allocation file (JSON)
    #[arg(long)]
    genesis: Option<PathBuf>,

    /// HTTP RPC bind address
    #[arg(long)]
    rpc_addr: Option<String>,

    /// WebSocket bind address
    #[arg(long)]
    ws_addr: Option<String>,

    /// Consensus engine RPC endpoint
    #[arg(long)]
    consensus_rpc: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Keep state in memory only
    #[arg(long)]
    in_memory: bool,
}

impl Args {
    /// File values, overridden by any flag given
    fn into_config(self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };

        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(genesis) = self.genesis {
            config.genesis = genesis;
        }
        if let Some(rpc_addr) = self.rpc_addr {
            config.rpc_addr = rpc_addr;
        }
        if let Some(ws_addr) = self.ws_addr {
            config.ws_addr = ws_addr;
        }
        if let Some(consensus_rpc) = self.consensus_rpc {
            config.consensus_rpc = consensus_rpc;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        if self.in_memory {
            config.in_memory = true;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    run(config).await
}

async fn run(config: NodeConfig) -> Result<()> {
    tracing::info!("Starting BFT ledger node");
    tracing::info!("  HTTP RPC: {}", config.rpc_addr);
    tracing::info!("  WebSocket: {}", config.ws_addr);
    tracing::info!("  Consensus RPC: {}", config.consensus_rpc);
    tracing::info!("  Genesis: {:?}", config.genesis);

    let genesis = Genesis::load(&config.genesis)
        .with_context(|| format!("loading genesis from {}", config.genesis.display()))?;
    tracing::info!(
        "Chain id {}, {} genesis accounts",
        genesis.chain_id,
        genesis.alloc.len()
    );

    let ledger_config = LedgerConfig {
        state_history: config.state_history,
    };
    let ledger = if config.in_memory {
        tracing::warn!("Running in memory; state is lost on shutdown");
        Ledger::in_memory(&genesis, ledger_config)?
    } else {
        tracing::info!("  Data directory: {:?}", config.data_dir);
        std::fs::create_dir_all(&config.data_dir)?;
        Ledger::open(&config.data_dir, &genesis, ledger_config)?
    };

    let app = Application::new(Arc::new(ledger), TransactionCodec::new(genesis.chain_id))?;
    let commits = app.subscribe();

    // Forwarding to the consensus engine
    let client = Arc::new(RpcConsensusClient::new(
        &config.consensus_rpc,
        config.forward_timeout(),
    )?);
    let bridge = Arc::new(SubmissionBridge::new(
        app.pool_validator(),
        client,
        config.forward_timeout(),
    ));

    let readiness_bridge = bridge.clone();
    let attempts = config.consensus_wait_attempts;
    let interval = config.consensus_wait_interval();
    tokio::spawn(async move {
        if let Err(e) = readiness_bridge.wait_for_consensus(attempts, interval).await {
            tracing::warn!(
                "Consensus engine unreachable after {} attempts: {}; submissions will fail until it is up",
                attempts,
                e
            );
        }
    });

    // Account subscriptions fed by commits
    let subscription_manager = Arc::new(SubscriptionManager::new());
    let commit_listener = subscription_manager.clone().spawn_commit_listener(commits);

    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
    let rpc_context = Arc::new(RpcContext::new(
        Arc::new(Mutex::new(app)),
        bridge,
        fatal_tx,
    ));

    // Start HTTP RPC server
    let http_context = rpc_context.clone();
    let http_addr = config.rpc_addr.clone();
    let http_server = tokio::spawn(async move {
        let server = HttpRpcServer::new(http_context);
        if let Err(e) = server.run(&http_addr).await {
            tracing::error!("HTTP RPC server error: {}", e);
        }
    });

    // Start WebSocket server
    let ws_sub_mgr = subscription_manager.clone();
    let ws_addr = config.ws_addr.clone();
    let ws_server = tokio::spawn(async move {
        let server = WebSocketServer::new(ws_sub_mgr);
        if let Err(e) = server.run(&ws_addr).await {
            tracing::error!("WebSocket server error: {}", e);
        }
    });

    tracing::info!("Node running. Press Ctrl+C to stop.");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutting down...");
        }
        Some(fatal) = fatal_rx.recv() => {
            tracing::error!("Fatal error, stopping node: {}", fatal);
            std::process::exit(1);
        }
    }

    let info = rpc_context.app.lock().info();
    tracing::info!(
        "Last committed block {} (state root {})",
        info.last_height,
        info.last_state_root
    );

    // Abort tasks
    commit_listener.abort();
    http_server.abort();
    ws_server.abort();

    tracing::info!("Node stopped");

    Ok(())
}
