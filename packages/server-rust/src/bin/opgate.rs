//! opgate process entry point.
//!
//! `opgate gateway`, `opgate dispatcher`, or `opgate standalone`. A `.env`
//! file in the working directory is loaded before arguments are parsed.

use clap::Parser;
use tracing::info;

use opgate_server::cli::Cli;
use opgate_server::{app, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_loaded = match dotenvy::dotenv() {
        Ok(_) => true,
        Err(dotenvy::Error::Io(_)) => false,
        Err(e) => return Err(e.into()),
    };

    let cli = Cli::parse();
    telemetry::init_tracing(cli.telemetry.log_format)?;
    if env_loaded {
        info!("loaded .env file");
    }
    if let Some(port) = cli.telemetry.metrics_port {
        telemetry::install_metrics_exporter(port)?;
    }

    app::run(cli.command, shutdown_signal()).await
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
