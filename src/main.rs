//! `journeyflow` - Guest fulfillment journey workflow engine

use clap::Parser;
use tokio_util::sync::CancellationToken;

use journeyflow::cli::args::Cli;
use journeyflow::cli::commands;
use journeyflow::error::ExitCode;
use journeyflow::observability::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.log_format, cli.verbose, cli.quiet, cli.color);

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    match commands::dispatch(cli, shutdown).await {
        Ok(()) => std::process::exit(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

/// First SIGINT/SIGTERM cancels `shutdown` so running journeys are stopped
/// and the journal is closed; a second one exits immediately.
async fn watch_signals(shutdown: CancellationToken) {
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                return;
            }
        };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }

    tracing::warn!("shutdown requested; finishing in-flight journeys");
    eprintln!("\nStopping journeys... (press Ctrl+C again to force)");
    shutdown.cancel();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => std::process::exit(ExitCode::INTERRUPTED),
        _ = sigterm.recv() => std::process::exit(ExitCode::TERMINATED),
    }
}
