//! # CLI
//!
//! Command-line interface of the bootstrapper.
//!
//! ## Usage
//!
//! ```bash
//! # Bootstrap with defaults (namespace upbound-system, sync every 10m)
//! uxp-bootstrapper bootstrap
//!
//! # Custom namespace and sync period, with upstream request logging
//! uxp-bootstrapper --debug bootstrap --namespace uxp --sync-period 1m
//! ```

use crate::config::{BootstrapOptions, parse_duration};
use crate::constants::{DEFAULT_NAMESPACE, DEFAULT_SYNC_PERIOD, DEFAULT_UPBOUND_API_URL};
use clap::{Args, Parser, Subcommand};
use std::time::Duration;

/// Universal Crossplane bootstrapper
#[derive(Debug, Parser)]
#[command(name = "uxp-bootstrapper", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose logging, including Upbound API requests and responses
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install and maintain the resources Universal Crossplane needs
    Bootstrap(BootstrapArgs),
}

#[derive(Debug, Clone, Args)]
pub struct BootstrapArgs {
    /// Maximum interval between forced re-reconciliations (e.g. 30s, 10m, 1h)
    #[arg(long, value_parser = parse_sync_period, default_value = DEFAULT_SYNC_PERIOD)]
    pub sync_period: Duration,

    /// Namespace that Universal Crossplane runs in
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Base URL of the Upbound API
    #[arg(long, default_value = DEFAULT_UPBOUND_API_URL)]
    pub upbound_api_url: String,
}

impl BootstrapArgs {
    #[must_use]
    pub fn into_options(self, debug: bool) -> BootstrapOptions {
        BootstrapOptions {
            sync_period: self.sync_period,
            namespace: self.namespace,
            upbound_api_url: self.upbound_api_url,
            debug,
        }
    }
}

fn parse_sync_period(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}
