//! Five-stage placeholder replacement.
//!
//! `open` drives detect, fetch, swap, invalidate and handoff for one path;
//! `resume` runs once at startup and consumes whatever handoff the previous
//! process left behind.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use lectern_cache::{CacheInvalidationCoordinator, InvalidationReport};
use lectern_core::{
    ContentFetcher, FetchError, FetchedArtifact, NavigationError, NavigationSink, RestartTicket,
    RetryPolicy, SwapError,
};
use lectern_events::{Event, EventBus, NoticeSeverity};
use lectern_fsops::FileReplacer;
use lectern_registry::PlaceholderRegistry;
use lectern_runtime::{HandoffLoad, RestartHandoff, RestartHandoffState};
use lectern_telemetry::Metrics;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::run::{FailedStage, WorkflowRun, WorkflowState};

/// Result of opening a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    /// The path holds real content; open it normally.
    NotPlaceholder,
    /// A run for the same path is still in flight; request ignored.
    AlreadyRunning,
    /// Content installed, handoff saved, restart accepted. The host should
    /// exit with the ticket's exit code.
    RestartRequested(RestartTicket),
    /// Content installed and opened in this process; handoff cleared.
    OpenedInProcess {
        /// Path that was opened.
        path: PathBuf,
    },
    /// Content installed but the in-process open failed; handoff cleared.
    InstalledNotOpened {
        /// Installed path.
        path: PathBuf,
        /// Navigation failure.
        message: String,
    },
    /// The run stopped at `stage`.
    Failed {
        /// Failing stage.
        stage: FailedStage,
        /// Diagnostic message.
        message: String,
    },
}

impl WorkflowOutcome {
    const fn metric_label(&self) -> &'static str {
        match self {
            Self::NotPlaceholder => "not_placeholder",
            Self::AlreadyRunning => "already_running",
            Self::RestartRequested(_) => "restart_requested",
            Self::OpenedInProcess { .. } => "opened_in_process",
            Self::InstalledNotOpened { .. } => "installed_not_opened",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Result of the startup resume hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResumeOutcome {
    /// Navigated to the saved folder.
    Resumed {
        /// Folder shown.
        folder: PathBuf,
    },
    /// The saved folder no longer exists.
    TargetMissing {
        /// Folder requested.
        folder: PathBuf,
    },
    /// No fresh handoff was pending.
    NothingPending,
}

/// Collaborators used by the orchestrator.
#[derive(Clone)]
pub struct OrchestratorDeps {
    /// Source of truth for stand-ins.
    pub registry: Arc<PlaceholderRegistry>,
    /// Download executor.
    pub fetcher: Arc<dyn ContentFetcher>,
    /// Whole-fetch retry policy; transient failures only.
    pub fetch_policy: RetryPolicy,
    /// File replacer.
    pub replacer: FileReplacer,
    /// Cache invalidation targets.
    pub caches: CacheInvalidationCoordinator,
    /// Handoff record and restart mechanisms.
    pub handoff: RestartHandoff,
    /// UI navigation sink.
    pub navigation: Arc<dyn NavigationSink>,
    /// Event bus for diagnostics and notices.
    pub events: EventBus,
    /// Metrics registry.
    pub metrics: Metrics,
}

/// Drives replacement runs, one at a time per path.
pub struct WorkflowOrchestrator {
    deps: OrchestratorDeps,
    in_flight: Mutex<HashSet<PathBuf>>,
}

struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock_set(self.set).remove(&self.path);
    }
}

fn lock_set(set: &Mutex<HashSet<PathBuf>>) -> MutexGuard<'_, HashSet<PathBuf>> {
    match set.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            error!("in-flight run mutex poisoned; continuing with recovered guard");
            poisoned.into_inner()
        }
    }
}

impl WorkflowOrchestrator {
    /// Orchestrator over the provided collaborators.
    #[must_use]
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            deps,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Collaborators in use.
    #[must_use]
    pub const fn deps(&self) -> &OrchestratorDeps {
        &self.deps
    }

    /// Whether a run for `path` is in flight.
    #[must_use]
    pub fn is_running(&self, path: &Path) -> bool {
        lock_set(&self.in_flight).contains(path)
    }

    fn try_claim(&self, path: &Path) -> Option<InFlightGuard<'_>> {
        let inserted = lock_set(&self.in_flight).insert(path.to_path_buf());
        inserted.then(|| InFlightGuard {
            set: &self.in_flight,
            path: path.to_path_buf(),
        })
    }

    /// Open `path`, replacing it first when it is a registered placeholder.
    pub async fn open(&self, path: &Path) -> WorkflowOutcome {
        let Some(record) = self.deps.registry.get(path) else {
            return WorkflowOutcome::NotPlaceholder;
        };
        let Some(_guard) = self.try_claim(path) else {
            info!(path = %path.display(), "replacement already in flight; ignoring open");
            return WorkflowOutcome::AlreadyRunning;
        };

        let mut run = WorkflowRun::new(path, Some(record.identity.clone()));
        self.enter(&mut run, WorkflowState::Detected, None);
        self.publish(Event::WorkflowStarted {
            run_id: run.id(),
            path: path.display().to_string(),
            identity: record.identity.clone(),
        });

        let outcome = self.replace(&mut run, &record.identity).await;
        self.deps.metrics.inc_workflow_run(outcome.metric_label());
        run.log_summary();
        outcome
    }

    async fn replace(&self, run: &mut WorkflowRun, identity: &str) -> WorkflowOutcome {
        let path = run.path().to_path_buf();

        self.enter(run, WorkflowState::Fetching, None);
        let artifact = match self.fetch_with_retry(run, identity).await {
            Ok(artifact) => artifact,
            Err(err) => {
                let message = format!("download failed: {}", err.detail());
                self.notify(
                    NoticeSeverity::Error,
                    format!("Could not download {}: {}", display_name(&path), err.detail()),
                );
                return self.fail(run, FailedStage::Fetch, message);
            }
        };

        self.enter(run, WorkflowState::Swapping, None);
        let final_path = path.clone();
        match self
            .deps
            .replacer
            .swap(&path, &artifact.temp_path, &final_path)
            .await
        {
            Ok(outcome) => {
                self.deps.metrics.inc_swap_attempt("success");
                if outcome.placeholder_was_missing {
                    info!(run_id = %run.id(), "placeholder was already gone; completed earlier partial swap");
                }
            }
            Err(err) => return self.swap_failed(run, &artifact, err),
        }

        if let Err(err) = self.deps.registry.remove(&path) {
            error!(
                run_id = %run.id(),
                stage = "swap",
                error = %err,
                path = %path.display(),
                "content installed but registry still lists it as a placeholder"
            );
        }

        self.enter(run, WorkflowState::Invalidating, None);
        let report = self.deps.caches.invalidate_all(&path, &final_path).await;
        self.record_invalidation(run, &report);

        let folder = final_path
            .parent()
            .map_or_else(|| final_path.clone(), Path::to_path_buf);
        let state = RestartHandoffState::new(&folder, Some(final_path.clone()));
        if let Err(err) = self.deps.handoff.save(&state).await {
            warn!(
                run_id = %run.id(),
                stage = "handoff",
                error = %err,
                "could not persist restart handoff; opening in-process"
            );
            return self.open_in_process(run, &final_path).await;
        }
        self.enter(run, WorkflowState::HandoffPersisted, None);
        self.publish(Event::HandoffPersisted {
            run_id: run.id(),
            folder: folder.display().to_string(),
        });

        if let Some(ticket) = self.deps.handoff.request_restart().await {
            self.deps.metrics.inc_restart_request("requested");
            self.publish(Event::RestartRequested {
                run_id: run.id(),
                mechanism: ticket.mechanism.clone(),
            });
            run.advance(WorkflowState::Done, Some(format!("restart via {}", ticket.mechanism)));
            return WorkflowOutcome::RestartRequested(ticket);
        }

        self.deps.metrics.inc_restart_request("unavailable");
        self.publish(Event::RestartUnavailable { run_id: run.id() });
        info!(
            run_id = %run.id(),
            stage = "restart",
            "restart unavailable; falling back to in-process open"
        );
        self.open_in_process(run, &final_path).await
    }

    async fn fetch_with_retry(
        &self,
        run: &WorkflowRun,
        identity: &str,
    ) -> Result<FetchedArtifact, FetchError> {
        let policy = self.deps.fetch_policy;
        let mut attempt = 1;
        loop {
            match self.deps.fetcher.fetch(identity).await {
                Ok(artifact) => {
                    self.deps.metrics.inc_fetch_attempt("success");
                    return Ok(artifact);
                }
                Err(err) if err.is_transient() && policy.should_retry(attempt) => {
                    self.deps.metrics.inc_fetch_attempt("transient");
                    warn!(
                        run_id = %run.id(),
                        stage = "fetch",
                        attempt,
                        error = %err.detail(),
                        "transient fetch failure; retrying"
                    );
                    self.publish(Event::FetchRetried {
                        run_id: run.id(),
                        attempt,
                        message: err.detail().to_string(),
                    });
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.deps.metrics.inc_fetch_attempt(if err.is_transient() {
                        "transient"
                    } else {
                        "permanent"
                    });
                    return Err(err);
                }
            }
        }
    }

    fn swap_failed(
        &self,
        run: &mut WorkflowRun,
        artifact: &FetchedArtifact,
        err: SwapError,
    ) -> WorkflowOutcome {
        self.deps.metrics.inc_swap_attempt(err.kind());
        let path = run.path().to_path_buf();
        if let SwapError::PartialSwap {
            final_path,
            retained_temp,
            ..
        } = &err
        {
            error!(
                run_id = %run.id(),
                stage = "swap",
                final_path = %final_path.display(),
                retained_temp = %retained_temp.display(),
                "PARTIAL SWAP: placeholder deleted but content not installed; manual recovery required"
            );
            self.publish(Event::SwapIncomplete {
                run_id: run.id(),
                path: final_path.display().to_string(),
                retained_temp: retained_temp.display().to_string(),
            });
            self.notify(
                NoticeSeverity::Error,
                format!(
                    "{} could not be installed. The downloaded copy was kept at {}.",
                    display_name(final_path),
                    retained_temp.display()
                ),
            );
        } else {
            warn!(
                run_id = %run.id(),
                stage = "swap",
                kind = err.kind(),
                retained_temp = %artifact.temp_path.display(),
                "swap failed before the placeholder was removed"
            );
            self.notify(
                NoticeSeverity::Error,
                format!("Could not replace {}; try opening it again.", display_name(&path)),
            );
        }
        let message = format!("swap failed ({}): {}", err.kind(), error_chain(&err));
        self.fail(run, FailedStage::Swap, message)
    }

    fn record_invalidation(&self, run: &WorkflowRun, report: &InvalidationReport) {
        for entry in &report.targets {
            self.deps
                .metrics
                .inc_cache_invalidation(&entry.target, entry.outcome.label());
        }
        self.publish(Event::CacheInvalidated {
            run_id: run.id(),
            invalidated: report.invalidated(),
            skipped: report.skipped(),
            failed: report.failed(),
        });
    }

    async fn open_in_process(&self, run: &mut WorkflowRun, path: &Path) -> WorkflowOutcome {
        let opened = self.deps.navigation.open_content(path).await;
        if let Err(err) = self.deps.handoff.clear().await {
            error!(
                run_id = %run.id(),
                stage = "handoff",
                error = %err,
                "failed to clear unused restart handoff"
            );
        }
        match opened {
            Ok(()) => {
                self.publish(Event::OpenedInProcess {
                    run_id: run.id(),
                    path: path.display().to_string(),
                });
                run.advance(WorkflowState::Done, Some("opened in-process".to_string()));
                WorkflowOutcome::OpenedInProcess {
                    path: path.to_path_buf(),
                }
            }
            Err(err) => {
                warn!(
                    run_id = %run.id(),
                    stage = "navigation",
                    error = %err,
                    path = %path.display(),
                    "could not open installed content"
                );
                self.notify_navigation_failure(&err);
                run.advance(WorkflowState::Done, Some("installed; open failed".to_string()));
                WorkflowOutcome::InstalledNotOpened {
                    path: path.to_path_buf(),
                    message: error_chain(&err),
                }
            }
        }
    }

    /// Consume any pending handoff and navigate to it.
    ///
    /// Called once at process start. Stale, unreadable or unknown-schema
    /// records are dropped silently.
    pub async fn resume(&self) -> ResumeOutcome {
        let load = self.deps.handoff.consume().await;
        self.deps.metrics.inc_handoff_load(load.label());
        let HandoffLoad::Consumed(state) = load else {
            return ResumeOutcome::NothingPending;
        };

        let mut run = WorkflowRun::new(&state.folder_path, None);
        run.advance(WorkflowState::Resumed, None);
        let folder = state.folder_path.clone();
        let outcome = match self.deps.navigation.navigate(&folder).await {
            Ok(()) => {
                info!(
                    folder = %folder.display(),
                    book = ?state.book_path,
                    "resumed navigation after restart"
                );
                self.publish(Event::Resumed {
                    folder: folder.display().to_string(),
                });
                let subject = state
                    .book_path
                    .as_deref()
                    .map_or_else(|| display_name(&folder), display_name);
                self.notify(NoticeSeverity::Info, format!("{subject} is ready."));
                ResumeOutcome::Resumed { folder }
            }
            Err(err) => {
                warn!(
                    stage = "resume",
                    error = %err,
                    folder = %folder.display(),
                    "handoff navigation target unavailable"
                );
                self.notify_navigation_failure(&err);
                ResumeOutcome::TargetMissing { folder }
            }
        };
        run.advance(WorkflowState::Done, None);
        run.log_summary();
        outcome
    }

    fn enter(&self, run: &mut WorkflowRun, state: WorkflowState, detail: Option<String>) {
        if run.advance(state, detail) {
            self.deps.metrics.inc_stage(state.as_str(), "entered");
            self.publish(Event::StageEntered {
                run_id: run.id(),
                stage: state.as_str().to_string(),
            });
        }
    }

    fn fail(&self, run: &mut WorkflowRun, stage: FailedStage, message: String) -> WorkflowOutcome {
        run.advance(WorkflowState::Failed(stage), Some(message.clone()));
        self.deps.metrics.inc_stage(stage.as_str(), "failed");
        error!(
            run_id = %run.id(),
            stage = stage.as_str(),
            path = %run.path().display(),
            detail = %message,
            "workflow failed"
        );
        self.publish(Event::WorkflowFailed {
            run_id: run.id(),
            stage: stage.as_str().to_string(),
            message: message.clone(),
        });
        WorkflowOutcome::Failed { stage, message }
    }

    fn notify_navigation_failure(&self, err: &NavigationError) {
        let message = match err {
            NavigationError::TargetMissing { path } => {
                format!("{} does not exist.", path.display())
            }
            NavigationError::Io { path, .. } => format!("Could not open {}.", path.display()),
        };
        self.notify(NoticeSeverity::Error, message);
    }

    fn notify(&self, severity: NoticeSeverity, message: String) {
        self.publish(Event::Notice { severity, message });
    }

    fn publish(&self, event: Event) {
        self.deps.events.publish(event);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
