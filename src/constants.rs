//! # Constants
//!
//! Shared constants used throughout the bootstrapper.
//!
//! These values represent reasonable defaults and can be overridden via
//! command-line flags or environment variables where applicable.

/// Field manager / managed-by value written to every object the bootstrapper owns
pub const CONTROLLER_NAME: &str = "uxp-bootstrapper";

/// Default interval between forced re-reconciliations
pub const DEFAULT_SYNC_PERIOD: &str = "10m";

/// Default namespace the bootstrapper watches and writes to
pub const DEFAULT_NAMESPACE: &str = "upbound-system";

/// Default Upbound API base URL
pub const DEFAULT_UPBOUND_API_URL: &str = "https://api.upbound.io";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default time allowed for in-flight reconciliations to finish on shutdown (seconds)
pub const DEFAULT_SHUTDOWN_GRACE_PERIOD_SECS: u64 = 30;

/// Default number of reconciliations that may run at once across all targets
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: usize = 4;

/// Default exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;

/// Floor for both backoff bounds so a transient failure never requeues immediately
pub const MIN_BACKOFF_MS: u64 = 1;

/// Consecutive transient failures tolerated before falling back to the sync period
pub const DEFAULT_MAX_TRANSIENT_REQUEUES: u32 = 8;

/// Attempts made against the Upbound API within a single pass
pub const DEFAULT_API_RETRY_ATTEMPTS: u32 = 3;

/// Delay between Upbound API attempts within a single pass (milliseconds)
pub const DEFAULT_API_RETRY_DELAY_MS: u64 = 500;

/// Per-request timeout for Upbound API calls (seconds)
pub const DEFAULT_API_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Secret holding the control plane token issued by Upbound
pub const CONTROL_PLANE_TOKEN_SECRET: &str = "upbound-control-plane-token";

/// Key of the token inside [`CONTROL_PLANE_TOKEN_SECRET`]
pub const CONTROL_PLANE_TOKEN_KEY: &str = "token";

/// Secret the bootstrapper maintains with the Upbound gateway public certificates
pub const PUBLIC_CERTS_SECRET: &str = "upbound-agent-public-certs";

/// Key of the JWT public key inside [`PUBLIC_CERTS_SECRET`]
pub const JWT_PUBLIC_KEY_KEY: &str = "jwtPublicKey";

/// Key of the NATS CA bundle inside [`PUBLIC_CERTS_SECRET`]
pub const NATS_CA_KEY: &str = "natsCA";

/// ConfigMap holding the control plane identity and the bootstrap condition
pub const IDENTITY_CONFIG_MAP: &str = "universal-crossplane-config";

/// Key of the control plane ID inside [`IDENTITY_CONFIG_MAP`]
pub const CONTROL_PLANE_ID_KEY: &str = "controlPlaneID";

/// Label marking objects written by the bootstrapper
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Condition annotations on [`IDENTITY_CONFIG_MAP`]
pub const READY_ANNOTATION: &str = "bootstrap.upbound.io/ready";
pub const REASON_ANNOTATION: &str = "bootstrap.upbound.io/reason";
pub const MESSAGE_ANNOTATION: &str = "bootstrap.upbound.io/message";
pub const LAST_TRANSITION_ANNOTATION: &str = "bootstrap.upbound.io/last-transition-time";
