//! Prometheus metrics for the hub, crawl tasks and scheduled jobs
//!
//! This module provides metrics tracking for:
//! - Hub: live subscribers, broadcasts, slow-consumer evictions
//! - Crawl tasks: transitions by operation and outcome
//! - Scheduler: job runs by outcome and run duration
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for hub and task metrics
struct CoordinationMetrics {
    hub_subscribers: Gauge,
    hub_broadcasts: Counter,
    hub_evictions: Counter,
    task_transitions: CounterVec,
}

/// Container for scheduled job metrics
struct JobMetrics {
    runs: CounterVec,
    duration: HistogramVec,
}

static COORDINATION_METRICS: OnceLock<CoordinationMetrics> = OnceLock::new();

static JOB_METRICS: OnceLock<JobMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Call once at startup. If registration fails the error is returned and
/// every recording function stays a no-op.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let coordination = CoordinationMetrics {
        hub_subscribers: register_gauge!(
            "blogd_hub_subscribers",
            "Number of WebSocket subscribers registered with the hub"
        )?,
        hub_broadcasts: register_counter!(
            "blogd_hub_broadcasts_total",
            "Total events fanned out by the hub"
        )?,
        hub_evictions: register_counter!(
            "blogd_hub_evictions_total",
            "Total subscribers dropped because their queue was full"
        )?,
        task_transitions: register_counter_vec!(
            "blogd_task_transitions_total",
            "Crawl task operations by operation and outcome",
            &["op", "outcome"]
        )?,
    };

    let jobs = JobMetrics {
        runs: register_counter_vec!(
            "blogd_job_runs_total",
            "Scheduled job runs by job and outcome",
            &["job", "outcome"]
        )?,
        duration: register_histogram_vec!(
            "blogd_job_duration_seconds",
            "Scheduled job run duration in seconds",
            &["job"],
            vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
        )?,
    };

    COORDINATION_METRICS
        .set(coordination)
        .map_err(|_| "Coordination metrics already initialized")?;
    JOB_METRICS.set(jobs).map_err(|_| "Job metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    COORDINATION_METRICS.get().is_some() && JOB_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn set_hub_subscribers(count: usize) {
    if let Some(m) = COORDINATION_METRICS.get() {
        m.hub_subscribers.set(count as f64);
    }
}

pub fn record_hub_broadcast() {
    if let Some(m) = COORDINATION_METRICS.get() {
        m.hub_broadcasts.inc();
    }
}

pub fn record_hub_eviction() {
    if let Some(m) = COORDINATION_METRICS.get() {
        m.hub_evictions.inc();
    }
}

/// Record a crawl task operation (`register`, `update_status`, `complete`, `fail`)
pub fn record_task_transition(op: &str, outcome: &str) {
    if let Some(m) = COORDINATION_METRICS.get() {
        m.task_transitions.with_label_values(&[op, outcome]).inc();
    }
}

/// Record one finished job run
pub fn record_job_run(job: &str, success: bool, duration_secs: f64) {
    let Some(m) = JOB_METRICS.get() else {
        return;
    };

    let outcome = if success { "success" } else { "failure" };
    m.runs.with_label_values(&[job, outcome]).inc();
    m.duration.with_label_values(&[job]).observe(duration_secs);
}

// ============================================================================
// Tests
// ============================================================================
