//! Command-line interface for prototail
//!
//! Consumed messages are written to stdout (or per-topic files with
//! `--output-dir`); logs go to stderr unless `--log-file` says otherwise.
//! SIGINT and SIGTERM stop consumption gracefully: buffered messages are
//! drained and the stored offsets are flushed before exiting.

use clap::Parser;
use prototail::{init_logging, run, Cli};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run_cli().await {
        eprintln!("FATAL: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let shutdown = CancellationToken::new();
    spawn_shutdown_handler(shutdown.clone());

    let summary = run(cli.config, shutdown).await?;
    info!("Done: {}", summary.report);
    Ok(())
}

/// Cancel `shutdown` on the first interrupt or termination signal.
fn spawn_shutdown_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            received = tokio::signal::ctrl_c() => match received {
                Ok(()) => info!("Received interrupt signal (Ctrl+C)"),
                Err(e) => {
                    error!("Failed to install the Ctrl+C handler: {e}");
                    return;
                }
            },
            _ = terminate() => info!("Received termination signal"),
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install the SIGTERM handler: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
