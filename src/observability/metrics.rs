//! # Metrics
//!
//! Prometheus metrics for monitoring the bootstrapper.
//!
//! ## Metrics Exposed
//!
//! - `uxp_bootstrapper_reconciliations_total` - Total number of reconciliation passes
//! - `uxp_bootstrapper_reconciliation_errors_total` - Total number of failed passes
//! - `uxp_bootstrapper_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `uxp_bootstrapper_requeues_total{reason}` - Requeues scheduled, by reason
//! - `uxp_bootstrapper_resource_writes_total{kind,operation}` - Corrective writes applied
//! - `uxp_bootstrapper_upstream_requests_total{outcome}` - Upbound API calls, by outcome
//! - `uxp_bootstrapper_upstream_request_duration_seconds` - Duration of Upbound API calls

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "uxp_bootstrapper_reconciliations_total",
        "Total number of reconciliation passes",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "uxp_bootstrapper_reconciliation_errors_total",
        "Total number of reconciliation passes that ended in an error",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "uxp_bootstrapper_reconciliation_duration_seconds",
            "Duration of reconciliation passes in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "uxp_bootstrapper_requeues_total",
            "Total number of requeues scheduled",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static RESOURCE_WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "uxp_bootstrapper_resource_writes_total",
            "Total number of corrective writes applied to the cluster",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create RESOURCE_WRITES_TOTAL metric - this should never happen")
});

static UPSTREAM_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "uxp_bootstrapper_upstream_requests_total",
            "Total number of Upbound API requests",
        ),
        &["outcome"],
    )
    .expect("Failed to create UPSTREAM_REQUESTS_TOTAL metric - this should never happen")
});

static UPSTREAM_REQUEST_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "uxp_bootstrapper_upstream_request_duration_seconds",
            "Duration of Upbound API requests in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create UPSTREAM_REQUEST_DURATION metric - this should never happen")
});

/// Register all metrics with [`REGISTRY`]
///
/// # Errors
/// Returns an error if a metric is registered twice
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOURCE_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UPSTREAM_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UPSTREAM_REQUEST_DURATION.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_resource_writes(kind: &str, operation: &str) {
    RESOURCE_WRITES_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
}

pub fn record_upstream_request(outcome: &str, duration: f64) {
    UPSTREAM_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
    UPSTREAM_REQUEST_DURATION.observe(duration);
}
