//! Renderers for command results.

use std::io::{self, Write};

use anyhow::anyhow;
use lectern_app::{HealthReport, HealthStatus, ResumeOutcome, WorkflowOutcome};
use lectern_core::PlaceholderRecord;
use lectern_events::{Event, EventEnvelope};
use serde::Serialize;

use crate::error::{CliError, CliResult};

pub(crate) fn render_json<T: Serialize>(out: &mut dyn Write, value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    writeln!(out, "{text}")?;
    Ok(())
}

pub(crate) fn render_outcome(out: &mut dyn Write, outcome: &WorkflowOutcome) -> io::Result<()> {
    match outcome {
        WorkflowOutcome::NotPlaceholder => Ok(()),
        WorkflowOutcome::AlreadyRunning => writeln!(out, "already downloading; request ignored"),
        WorkflowOutcome::RestartRequested(ticket) => writeln!(
            out,
            "content installed; restarting via {} (exit {})",
            ticket.mechanism, ticket.exit_code
        ),
        WorkflowOutcome::OpenedInProcess { path } => {
            writeln!(out, "content installed at {}", path.display())
        }
        WorkflowOutcome::InstalledNotOpened { path, message } => writeln!(
            out,
            "content installed at {} but could not be opened: {message}",
            path.display()
        ),
        WorkflowOutcome::Failed { stage, message } => {
            writeln!(out, "failed at {}: {message}", stage.as_str())
        }
    }
}

pub(crate) fn render_resume(out: &mut dyn Write, outcome: &ResumeOutcome) -> io::Result<()> {
    match outcome {
        ResumeOutcome::Resumed { folder } => writeln!(out, "resumed in {}", folder.display()),
        ResumeOutcome::TargetMissing { folder } => {
            writeln!(out, "resume target {} is gone", folder.display())
        }
        ResumeOutcome::NothingPending => writeln!(out, "nothing to resume"),
    }
}

pub(crate) fn render_health(out: &mut dyn Write, report: &HealthReport) -> io::Result<()> {
    writeln!(out, "{:<18} {:<6} DETAIL", "CHECK", "STATUS")?;
    for check in &report.checks {
        let status = match check.status {
            HealthStatus::Pass => "pass",
            HealthStatus::Fail => "FAIL",
        };
        writeln!(out, "{:<18} {:<6} {}", check.name, status, check.detail)?;
    }
    Ok(())
}

pub(crate) fn render_placeholders(
    out: &mut dyn Write,
    records: &[PlaceholderRecord],
) -> io::Result<()> {
    if records.is_empty() {
        return writeln!(out, "no placeholders registered");
    }
    writeln!(out, "{:<24} {:<25} PATH", "IDENTITY", "REGISTERED")?;
    for record in records {
        writeln!(
            out,
            "{:<24} {:<25} {}",
            record.identity,
            record.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            record.path.display()
        )?;
    }
    Ok(())
}

/// Print every user notice in `events`; returns how many were printed.
pub(crate) fn render_notices(out: &mut dyn Write, events: &[EventEnvelope]) -> io::Result<usize> {
    let mut printed = 0;
    for envelope in events {
        if let Event::Notice { severity, message } = &envelope.event {
            writeln!(out, "{}: {message}", severity.as_str())?;
            printed += 1;
        }
    }
    Ok(printed)
}
