//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Provisioning (role and pipeline create/reuse)
//! - Activation waiting (polls, outcomes)
//! - Dispatch (batches, records, retries, permanent failures)

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Registry holding every core metric.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for metric in all_metrics() {
        if let Err(e) = registry.register(metric) {
            tracing::warn!("Failed to register metric: {}", e);
        }
    }
    registry
});

// =============================================================================
// Provisioning Metrics
// =============================================================================

/// Provisioning steps by resource and result.
pub static PROVISIONING_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamloader_provisioning_total",
            "Provisioning steps by resource and result",
        ),
        &["resource", "result"], // resource: "role", "pipeline"; result: "existing", "created", "failed"
    )
    .unwrap()
});

// =============================================================================
// Activation Metrics
// =============================================================================

/// Status polls issued while waiting for activation.
pub static ACTIVATION_POLLS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "streamloader_activation_polls_total",
        "Pipeline status polls issued while waiting for activation",
    )
    .unwrap()
});

/// Activation wait outcomes.
pub static ACTIVATION_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamloader_activation_outcomes_total",
            "Activation wait outcomes",
        ),
        &["outcome"], // "active", "timeout", "terminal", "cancelled"
    )
    .unwrap()
});

// =============================================================================
// Dispatch Metrics
// =============================================================================

/// Batch submissions by result.
pub static BATCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("streamloader_batches_total", "Batch submissions by result"),
        &["result"], // "complete", "partial", "transport_error"
    )
    .unwrap()
});

/// Batch submission latency.
pub static BATCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "streamloader_batch_duration_seconds",
            "Duration of one batch submission call",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &[],
    )
    .unwrap()
});

/// Records submitted in batches.
pub static RECORDS_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "streamloader_records_submitted_total",
        "Records submitted in batch calls",
    )
    .unwrap()
});

/// Records resubmitted individually after a batch rejection.
pub static RECORDS_RETRIED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "streamloader_records_retried_total",
        "Records resubmitted individually after batch rejection",
    )
    .unwrap()
});

/// Records that failed both the batch and the single-record retry.
pub static RECORDS_PERMANENTLY_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "streamloader_records_permanently_failed_total",
        "Records that failed their batch attempt and their retry",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(PROVISIONING_TOTAL.clone()),
        Box::new(ACTIVATION_POLLS.clone()),
        Box::new(ACTIVATION_OUTCOMES.clone()),
        Box::new(BATCHES_TOTAL.clone()),
        Box::new(BATCH_DURATION.clone()),
        Box::new(RECORDS_SUBMITTED.clone()),
        Box::new(RECORDS_RETRIED.clone()),
        Box::new(RECORDS_PERMANENTLY_FAILED.clone()),
    ]
}

/// Render every core metric in the Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
