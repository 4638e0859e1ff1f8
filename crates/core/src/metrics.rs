//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Pipeline (jobs, stages, identity renames)
//! - External tasks and service calls
//! - Batches and progress delivery

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Jobs finished total by result.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("forge_jobs_total", "Total jobs that reached a terminal stage"),
        &["result"], // "completed", "failed"
    )
    .unwrap()
});

/// Job duration in seconds.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("forge_job_duration_seconds", "Duration of complete jobs").buckets(
            vec![10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0, 1800.0],
        ),
        &["result"],
    )
    .unwrap()
});

/// Stage duration in seconds.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("forge_stage_duration_seconds", "Duration of pipeline stages")
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]),
        &["stage"], // "prompt", "image", "model"
    )
    .unwrap()
});

/// Identity renames total by result.
pub static IDENTITY_RENAMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("forge_identity_renames_total", "Total working directory renames"),
        &["result"], // "renamed", "suffixed", "collision"
    )
    .unwrap()
});

// =============================================================================
// External Task Metrics
// =============================================================================

/// External tasks waited on, by outcome.
pub static EXTERNAL_TASKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("forge_external_tasks_total", "Total external task waits by outcome"),
        &["result"], // "succeeded", "failed", "timeout"
    )
    .unwrap()
});

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "forge_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Batch Metrics
// =============================================================================

/// Batches run total.
pub static BATCHES_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("forge_batches_total", "Total batches run").unwrap());

/// Batch items finished total by result.
pub static BATCH_ITEMS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("forge_batch_items_total", "Total batch items finished"),
        &["result"], // "completed", "failed"
    )
    .unwrap()
});

/// Progress events dropped because the observer queue stayed full.
pub static PROGRESS_EVENTS_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "forge_progress_events_dropped_total",
        "Total progress events dropped after the queue stayed full",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Pipeline
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(STAGE_DURATION.clone()),
        Box::new(IDENTITY_RENAMES.clone()),
        // External
        Box::new(EXTERNAL_TASKS.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
        // Batch
        Box::new(BATCHES_TOTAL.clone()),
        Box::new(BATCH_ITEMS.clone()),
        Box::new(PROGRESS_EVENTS_DROPPED.clone()),
    ]
}
