//! respite server binary.
//!
//! Parses the command line, sets up logging, and serves clients until
//! Ctrl+C.

use respite::config::{CliAction, Config, HELP};
use respite::connection::ConnectionStats;
use respite::storage::{start_expiry_sweeper, StorageEngine};
use respite::{server, VERSION};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            println!("{}", HELP);
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("respite version {}", VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", HELP);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(version = VERSION, "Starting respite");

    let storage = Arc::new(StorageEngine::new());

    let _sweeper = if config.active_expiry {
        Some(start_expiry_sweeper(Arc::clone(&storage)))
    } else {
        info!("Active expiry disabled, keys expire on access only");
        None
    };

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    server::run(listener, Arc::clone(&storage), Arc::clone(&stats), shutdown).await;

    let store = storage.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(Ordering::Relaxed),
        keys = store.keys,
        gets = store.get_ops,
        sets = store.set_ops,
        expired = store.expired,
        "Server shutdown complete"
    );
    Ok(())
}
