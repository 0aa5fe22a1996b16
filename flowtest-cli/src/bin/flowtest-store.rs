//! Reference metadata store: newline-delimited JSON over a Unix socket.
//!
//! Serves until SIGINT/SIGTERM, then removes its socket file.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use flowtest_cli::logging;
use flowtest_cli::signal::ShutdownSignal;
use flowtest_store::{MemoryStore, server};
use flowtest_supervisor::store::STORE_LOG_LEVEL_ENV;

/// flowtest-store -- in-memory metadata store for flowtest runs.
#[derive(Parser, Debug)]
#[command(name = "flowtest-store", version, about, long_about = None)]
struct Args {
    /// Unix socket path to listen on.
    #[arg(long)]
    socket: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let level = std::env::var(STORE_LOG_LEVEL_ENV).unwrap_or_else(|_| "error".to_owned());
    if let Err(e) = logging::init_store_tracing(&level) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match serve(&args.socket).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), socket = %args.socket.display(), "store failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve(socket: &std::path::Path) -> Result<()> {
    let signals = ShutdownSignal::install().context("installing signal handlers")?;
    let listener = server::bind(socket)
        .with_context(|| format!("binding {}", socket.display()))?;
    let shutdown = CancellationToken::new();

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        let signal = signals.recv().await;
        info!(signal = %signal, "shutdown signal received");
        trigger.cancel();
    });

    server::serve(listener, Arc::new(MemoryStore::new()), shutdown)
        .await
        .context("serving")?;
    if let Err(e) = std::fs::remove_file(socket) {
        info!(error = %e, "socket already removed");
    }
    Ok(())
}
