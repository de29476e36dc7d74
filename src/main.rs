//! # Universal Crossplane Bootstrapper
//!
//! Binary entry point: parses flags, installs logging and metrics, starts the
//! probe server and runs the controller manager until SIGINT/SIGTERM.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{error, info};
use uxp_bootstrapper::cli::{Cli, Commands};
use uxp_bootstrapper::config::ControllerConfig;
use uxp_bootstrapper::controller::server::{ServerState, start_server};
use uxp_bootstrapper::observability::{init_logging, metrics};
use uxp_bootstrapper::runtime;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Both kube and reqwest speak TLS through rustls; pick the provider once
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|existing| {
            anyhow::anyhow!("Failed to install rustls crypto provider, found {existing:?}")
        })?;

    let config = ControllerConfig::from_env();
    init_logging(cli.debug, config.log_format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("BUILD_GIT_HASH"),
        build_datetime = env!("BUILD_DATETIME"),
        "Starting bootstrapper"
    );

    metrics::register_metrics()?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });
    let server_port = config.metrics_port;
    let server_state_clone = server_state.clone();
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    match cli.command {
        Commands::Bootstrap(args) => {
            let options = args.into_options(cli.debug);
            runtime::run(options, &config, server_state.is_ready.clone()).await?;
        }
    }

    info!("Bootstrapper stopped");
    Ok(())
}
