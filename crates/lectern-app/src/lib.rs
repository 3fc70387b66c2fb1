#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Lectern application wiring.
//!
//! Layout: `bootstrap.rs` (service wiring), `orchestrator.rs` (placeholder
//! replacement state machine), `run.rs` (per-run transition log),
//! `health.rs` (read-only diagnostics), `navigation.rs` (console sink).

/// Application bootstrap from configuration.
pub mod bootstrap;
/// Application errors.
pub mod error;
/// Read-only collaborator diagnostics.
pub mod health;
/// Console navigation sink.
pub mod navigation;
/// Placeholder replacement orchestration.
pub mod orchestrator;
/// Per-run state tracking.
pub mod run;

pub use bootstrap::{AppContext, UnconfiguredFetcher, logging_config};
pub use error::{AppError, AppResult};
pub use health::{HealthCheck, HealthCheckResult, HealthReport, HealthStatus};
pub use navigation::ConsoleNavigation;
pub use orchestrator::{OrchestratorDeps, ResumeOutcome, WorkflowOrchestrator, WorkflowOutcome};
pub use run::{FailedStage, WorkflowRun, WorkflowState};
