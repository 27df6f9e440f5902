//! Faucet service binary

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tco2_common::utils::converter::format_ether;
use tco2_common::utils::logging::init_logging;
use tco2_common::Address;
use tco2_faucet::{FaucetConfig, FaucetService, LedgerDatabase};
use tokio::signal;
use tracing::{info, warn};

/// Faucet service CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path (TOML, YAML or JSON)
    #[arg(short, long, env = "FAUCET_CONFIG")]
    config: Option<PathBuf>,

    /// Server address
    #[arg(long)]
    server_addr: Option<String>,

    /// Database path
    #[arg(long)]
    db_path: Option<String>,

    /// Owner / deployer address
    #[arg(long)]
    owner: Option<Address>,

    /// Withdrawal cooldown (seconds)
    #[arg(long)]
    timeout_limit: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => FaucetConfig::from_file(path)?,
        None => FaucetConfig::default(),
    };
    config.apply_env()?;

    // Override with CLI arguments
    if let Some(addr) = args.server_addr {
        config.server_addr = addr;
    }

    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }

    if let Some(owner) = args.owner {
        config.owner = owner;
    }

    if let Some(timeout) = args.timeout_limit {
        config.limits.timeout_limit_secs = timeout;
    }

    if args.debug {
        config.logging.level = "debug".to_string();
    }

    init_logging(&config.logging)?;
    config.validate()?;

    info!("Starting TCO2 Faucet v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Server address: {}", config.server_addr);
    info!("  Owner: {}", config.owner);
    info!("  Withdrawal cooldown: {}s", config.limits.timeout_limit_secs);
    info!(
        "  Max withdrawal: {} TCO2",
        format_ether(config.limits.max_withdrawal_amount)
    );
    info!("  Eligible pools: {}", config.eligible_pools.len());

    // Initialize database
    let database = LedgerDatabase::open(&config.db_path)?;
    info!("Database initialized at: {}", config.db_path);

    // Create faucet service
    let service = Arc::new(FaucetService::from_config(&config, database)?);
    info!("Faucet deployed at {}", service.address());

    let stats = service.status().await?.statistics;
    info!("Previous statistics:");
    info!("  Deposits: {}", stats.deposits);
    info!("  Withdrawals: {}", stats.withdrawals);

    let app = tco2_faucet::api::router(service.clone(), config.cors_enabled);

    // Start server
    let addr: SocketAddr = config.server_addr.parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = service.flush().await {
        warn!("Failed to flush ledger database: {}", e);
    }

    info!("Shutting down gracefully");
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
