//! # Configuration
//!
//! Two layers of configuration:
//!
//! - [`BootstrapOptions`]: the options of the `bootstrap` command (sync period,
//!   namespace, Upbound API URL, debug). Validated once and passed by value into
//!   the runtime host.
//! - [`ControllerConfig`]: runtime tunables (backoff, concurrency, grace period,
//!   metrics port) loaded from environment variables with defaults. Environment
//!   variables are populated from a ConfigMap using `envFrom` in the deployment.

mod bootstrap;
mod controller;
mod duration;

pub use bootstrap::{BootstrapOptions, ConfigError};
pub use controller::{ControllerConfig, LogFormat};
pub use duration::parse_duration;
