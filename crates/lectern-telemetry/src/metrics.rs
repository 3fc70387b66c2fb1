//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters relevant to the placeholder workflow.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    workflow_runs_total: IntCounterVec,
    workflow_stage_total: IntCounterVec,
    fetch_attempts_total: IntCounterVec,
    swap_attempts_total: IntCounterVec,
    cache_invalidations_total: IntCounterVec,
    cache_failures_total: IntCounter,
    handoff_loads_total: IntCounterVec,
    restart_requests_total: IntCounterVec,
}

/// Point-in-time totals used by health reporting and tests.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Runs that finished with an installed artifact.
    pub runs_succeeded: u64,
    /// Runs that ended in `Failed(fetch)` or `Failed(swap)`.
    pub runs_failed: u64,
    /// Fetch attempts that failed, transient or permanent.
    pub fetch_failures: u64,
    /// Cache targets that reported a failure.
    pub cache_failures: u64,
    /// Handoff loads that found a usable record.
    pub handoffs_consumed: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let workflow_runs_total = register_counter_vec(
            &registry,
            "workflow_runs_total",
            "Placeholder replacement runs by outcome",
            &["outcome"],
        )?;
        let workflow_stage_total = register_counter_vec(
            &registry,
            "workflow_stage_total",
            "Workflow stage transitions by status",
            &["stage", "status"],
        )?;
        let fetch_attempts_total = register_counter_vec(
            &registry,
            "fetch_attempts_total",
            "Download attempts by result",
            &["result"],
        )?;
        let swap_attempts_total = register_counter_vec(
            &registry,
            "swap_attempts_total",
            "Placeholder delete attempts by result",
            &["result"],
        )?;
        let cache_invalidations_total = register_counter_vec(
            &registry,
            "cache_invalidations_total",
            "Collaborator cache invalidations by target and result",
            &["target", "result"],
        )?;
        let cache_failures_total = IntCounter::with_opts(Opts::new(
            "cache_failures_total",
            "Collaborator cache invalidations that failed",
        ))
        .map_err(|source| TelemetryError::MetricBuild {
            name: "cache_failures_total",
            source,
        })?;
        registry
            .register(Box::new(cache_failures_total.clone()))
            .map_err(|source| TelemetryError::MetricRegister {
                name: "cache_failures_total",
                source,
            })?;
        let handoff_loads_total = register_counter_vec(
            &registry,
            "handoff_loads_total",
            "Restart handoff loads by result",
            &["result"],
        )?;
        let restart_requests_total = register_counter_vec(
            &registry,
            "restart_requests_total",
            "Process restart requests by result",
            &["result"],
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                workflow_runs_total,
                workflow_stage_total,
                fetch_attempts_total,
                swap_attempts_total,
                cache_invalidations_total,
                cache_failures_total,
                handoff_loads_total,
                restart_requests_total,
            }),
        })
    }

    /// Count a finished run.
    pub fn inc_workflow_run(&self, outcome: &str) {
        self.inner
            .workflow_runs_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Count a stage transition.
    pub fn inc_stage(&self, stage: &str, status: &str) {
        self.inner
            .workflow_stage_total
            .with_label_values(&[stage, status])
            .inc();
    }

    /// Count a fetch attempt.
    pub fn inc_fetch_attempt(&self, result: &str) {
        self.inner
            .fetch_attempts_total
            .with_label_values(&[result])
            .inc();
    }

    /// Count a placeholder delete attempt.
    pub fn inc_swap_attempt(&self, result: &str) {
        self.inner
            .swap_attempts_total
            .with_label_values(&[result])
            .inc();
    }

    /// Count a cache target outcome.
    pub fn inc_cache_invalidation(&self, target: &str, result: &str) {
        self.inner
            .cache_invalidations_total
            .with_label_values(&[target, result])
            .inc();
        if result == "failed" {
            self.inner.cache_failures_total.inc();
        }
    }

    /// Count a handoff load.
    pub fn inc_handoff_load(&self, result: &str) {
        self.inner
            .handoff_loads_total
            .with_label_values(&[result])
            .inc();
    }

    /// Count a restart request.
    pub fn inc_restart_request(&self, result: &str) {
        self.inner
            .restart_requests_total
            .with_label_values(&[result])
            .inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::Render { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::RenderUtf8 { source })
    }

    /// Take a point-in-time snapshot of the headline counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            runs_succeeded: counter(&inner.workflow_runs_total, &["restart_requested"])
                + counter(&inner.workflow_runs_total, &["opened_in_process"]),
            runs_failed: counter(&inner.workflow_runs_total, &["failed"]),
            fetch_failures: counter(&inner.fetch_attempts_total, &["transient"])
                + counter(&inner.fetch_attempts_total, &["permanent"]),
            cache_failures: inner.cache_failures_total.get(),
            handoffs_consumed: counter(&inner.handoff_loads_total, &["consumed"]),
        }
    }
}

fn register_counter_vec(
    registry: &Registry,
    name: &'static str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec> {
    let collector = IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricBuild { name, source })?;
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricRegister { name, source })?;
    Ok(collector)
}

fn counter(vec: &IntCounterVec, labels: &[&str]) -> u64 {
    vec.get_metric_with_label_values(labels)
        .map_or(0, |metric| metric.get())
}
