//! Read-only probes over the workflow collaborators.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lectern_core::{ContentFetcher, NavigationSink};
use lectern_events::{Event, EventBus};
use lectern_registry::PlaceholderRegistry;
use lectern_runtime::RestartHandoff;
use serde::Serialize;
use tracing::{info, warn};

/// Pass/fail status of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Probe passed.
    Pass,
    /// Probe failed.
    Fail,
}

/// Result of a named probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheckResult {
    /// Probe name.
    pub name: &'static str,
    /// Outcome.
    pub status: HealthStatus,
    /// Human-readable detail.
    pub detail: String,
}

impl HealthCheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: HealthStatus::Pass,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: HealthStatus::Fail,
            detail: detail.into(),
        }
    }

    fn from_result(name: &'static str, ok_detail: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(name, ok_detail),
            Err(detail) => Self::fail(name, detail),
        }
    }
}

/// Full health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Probe results in a fixed order.
    pub checks: Vec<HealthCheckResult>,
    /// When the report was produced.
    pub generated_at: DateTime<Utc>,
}

impl HealthReport {
    /// True when every probe passed.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.checks
            .iter()
            .all(|check| check.status == HealthStatus::Pass)
    }

    /// Names of failing probes.
    #[must_use]
    pub fn failing(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|check| check.status == HealthStatus::Fail)
            .map(|check| check.name.to_string())
            .collect()
    }
}

/// Runs every probe without mutating state.
pub struct HealthCheck {
    registry: Arc<PlaceholderRegistry>,
    fetcher: Arc<dyn ContentFetcher>,
    handoff: RestartHandoff,
    navigation: Arc<dyn NavigationSink>,
    library_root: PathBuf,
    events: EventBus,
}

impl HealthCheck {
    /// Health check over the provided collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<PlaceholderRegistry>,
        fetcher: Arc<dyn ContentFetcher>,
        handoff: RestartHandoff,
        navigation: Arc<dyn NavigationSink>,
        library_root: impl Into<PathBuf>,
        events: EventBus,
    ) -> Self {
        Self {
            registry,
            fetcher,
            handoff,
            navigation,
            library_root: library_root.into(),
            events,
        }
    }

    /// Run every probe and publish the failing set.
    pub async fn run(&self) -> HealthReport {
        let checks = vec![
            self.check_registry(),
            self.check_fetch().await,
            HealthCheckResult::from_result(
                "handoff_path",
                "handoff location writable",
                self.handoff.probe_writable().await,
            ),
            self.check_restart(),
            self.check_navigation().await,
        ];
        let report = HealthReport {
            checks,
            generated_at: Utc::now(),
        };

        let degraded = report.failing();
        if degraded.is_empty() {
            info!("health check passed");
        } else {
            warn!(degraded = ?degraded, "health check reported failures");
        }
        self.events.publish(Event::HealthChanged { degraded });
        report
    }

    fn check_registry(&self) -> HealthCheckResult {
        let store = self.registry.store_path().display();
        if self.registry.is_available() {
            HealthCheckResult::pass(
                "registry",
                format!("{} placeholders in {store}", self.registry.list_all().len()),
            )
        } else {
            HealthCheckResult::fail("registry", format!("{store} is unreadable"))
        }
    }

    async fn check_fetch(&self) -> HealthCheckResult {
        let library_present = tokio::fs::metadata(&self.library_root)
            .await
            .is_ok_and(|metadata| metadata.is_dir());
        if !library_present {
            return HealthCheckResult::fail(
                "fetch",
                format!("library root {} missing", self.library_root.display()),
            );
        }
        match self.fetcher.preflight().await {
            Ok(()) => HealthCheckResult::pass("fetch", "download endpoint configured"),
            Err(err) => HealthCheckResult::fail("fetch", err.detail().to_string()),
        }
    }

    fn check_restart(&self) -> HealthCheckResult {
        let names = self.handoff.mechanism_names();
        if self.handoff.restart_available() {
            HealthCheckResult::pass("restart", format!("mechanisms: {}", names.join(", ")))
        } else {
            HealthCheckResult::fail(
                "restart",
                "no restart mechanism available; content will open in-process",
            )
        }
    }

    async fn check_navigation(&self) -> HealthCheckResult {
        if self.navigation.target_available().await {
            HealthCheckResult::pass("navigation_target", "navigation target reachable")
        } else {
            HealthCheckResult::fail("navigation_target", "navigation target unavailable")
        }
    }
}
