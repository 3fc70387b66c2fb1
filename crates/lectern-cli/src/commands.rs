//! Subcommand handlers. Each returns the process exit code on success.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use lectern_app::{AppContext, ResumeOutcome, WorkflowOutcome};
use lectern_core::NavigationError;
use lectern_registry::RegistryError;
use tracing::{debug, info};

use crate::error::{CliError, CliResult, EXIT_UNSUCCESSFUL};
use crate::output::{
    render_health, render_json, render_outcome, render_placeholders, render_resume,
};

/// Relative paths are taken relative to the library root.
pub(crate) fn resolve(context: &AppContext, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        context.config().library_root.join(path)
    }
}

pub(crate) const fn outcome_exit_code(outcome: &WorkflowOutcome) -> i32 {
    match outcome {
        WorkflowOutcome::RestartRequested(ticket) => ticket.exit_code,
        WorkflowOutcome::Failed { .. } | WorkflowOutcome::InstalledNotOpened { .. } => {
            EXIT_UNSUCCESSFUL
        }
        WorkflowOutcome::NotPlaceholder
        | WorkflowOutcome::AlreadyRunning
        | WorkflowOutcome::OpenedInProcess { .. } => 0,
    }
}

pub(crate) async fn handle_open(
    context: &AppContext,
    path: &Path,
    out: &mut dyn Write,
) -> CliResult<i32> {
    let path = resolve(context, path);
    let outcome = context.orchestrator().open(&path).await;
    if outcome == WorkflowOutcome::NotPlaceholder {
        context
            .orchestrator()
            .deps()
            .navigation
            .open_content(&path)
            .await
            .map_err(|err| match err {
                NavigationError::TargetMissing { path } => {
                    CliError::validation(format!("{} does not exist", path.display()))
                }
                other => CliError::failure(other),
            })?;
    }
    render_outcome(out, &outcome)?;
    Ok(outcome_exit_code(&outcome))
}

/// Startup hook: consume the handoff left by a process that requested a
/// restart. Supervisors and restart commands rerun the original command
/// line, so this runs ahead of it. Results reach the user as notices.
pub(crate) async fn resume_pending(context: &AppContext) {
    let outcome = context.orchestrator().resume().await;
    if outcome != ResumeOutcome::NothingPending {
        debug!(outcome = ?outcome, "pending handoff consumed at startup");
    }
}

pub(crate) async fn handle_resume(context: &AppContext, out: &mut dyn Write) -> CliResult<i32> {
    let outcome = context.orchestrator().resume().await;
    render_resume(out, &outcome)?;
    Ok(match outcome {
        ResumeOutcome::TargetMissing { .. } => EXIT_UNSUCCESSFUL,
        ResumeOutcome::Resumed { .. } | ResumeOutcome::NothingPending => 0,
    })
}

pub(crate) async fn handle_health(
    context: &AppContext,
    json: bool,
    out: &mut dyn Write,
) -> CliResult<i32> {
    let report = context.health().run().await;
    if json {
        render_json(out, &report)?;
    } else {
        render_health(out, &report)?;
    }
    Ok(if report.is_healthy() {
        0
    } else {
        EXIT_UNSUCCESSFUL
    })
}

pub(crate) fn handle_register(
    context: &AppContext,
    identity: &str,
    path: &Path,
    out: &mut dyn Write,
) -> CliResult<i32> {
    if identity.trim().is_empty() {
        return Err(CliError::validation("identity must not be empty"));
    }
    let path = resolve(context, path);
    let record = context
        .registry()
        .materialize(identity, &path)
        .map_err(|err| match err {
            RegistryError::RealContent { path } => CliError::validation(format!(
                "{} already holds real content",
                path.display()
            )),
            other => CliError::failure(anyhow::Error::new(other).context("registration failed")),
        })?;
    info!(identity, path = %record.path.display(), "placeholder registered from cli");
    writeln!(out, "registered {} at {}", record.identity, record.path.display())?;
    Ok(0)
}

pub(crate) fn handle_list(context: &AppContext, json: bool, out: &mut dyn Write) -> CliResult<i32> {
    let records = context.registry().list_all();
    if json {
        render_json(out, &records)?;
    } else {
        render_placeholders(out, &records)?;
    }
    Ok(0)
}

pub(crate) fn handle_metrics(context: &AppContext, out: &mut dyn Write) -> CliResult<i32> {
    let text = context
        .metrics()
        .render()
        .map_err(|err| CliError::failure(anyhow!("failed to render metrics: {err}")))?;
    write!(out, "{text}")?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::RestartTicket;

    #[test]
    fn only_clean_outcomes_exit_zero() {
        assert_eq!(outcome_exit_code(&WorkflowOutcome::NotPlaceholder), 0);
        assert_eq!(
            outcome_exit_code(&WorkflowOutcome::OpenedInProcess {
                path: PathBuf::from("a.epub")
            }),
            0
        );
        assert_eq!(
            outcome_exit_code(&WorkflowOutcome::InstalledNotOpened {
                path: PathBuf::from("a.epub"),
                message: "navigation failed".to_string(),
            }),
            EXIT_UNSUCCESSFUL
        );
        assert_eq!(
            outcome_exit_code(&WorkflowOutcome::RestartRequested(RestartTicket {
                mechanism: "supervisor".to_string(),
                exit_code: 75,
            })),
            75
        );
    }
}
