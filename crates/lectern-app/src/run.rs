//! Transition log for a single replacement run.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Stage at which a run terminated unsuccessfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStage {
    /// Download failed; the placeholder is untouched.
    Fetch,
    /// Replacement failed; the fetched artifact is retained.
    Swap,
}

impl FailedStage {
    /// Stage tag used in diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Swap => "swap",
        }
    }
}

/// States of the replacement state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "stage")]
pub enum WorkflowState {
    /// Nothing happening.
    Idle,
    /// A placeholder was opened.
    Detected,
    /// Downloading the real content.
    Fetching,
    /// Replacing the placeholder on disk.
    Swapping,
    /// Invalidating collaborator caches.
    Invalidating,
    /// Handoff record written; a restart may follow.
    HandoffPersisted,
    /// A new process consumed the handoff.
    Resumed,
    /// Finished.
    Done,
    /// Terminated unsuccessfully.
    Failed(FailedStage),
}

impl WorkflowState {
    /// Stage label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Detected => "detected",
            Self::Fetching => "fetching",
            Self::Swapping => "swapping",
            Self::Invalidating => "invalidating",
            Self::HandoffPersisted => "handoff_persisted",
            Self::Resumed => "resumed",
            Self::Done => "done",
            Self::Failed(FailedStage::Fetch) => "failed_fetch",
            Self::Failed(FailedStage::Swap) => "failed_swap",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Whether `self -> next` is a legal edge.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Idle, Self::Detected | Self::Resumed)
            | (Self::Detected, Self::Fetching | Self::Failed(FailedStage::Fetch))
            | (Self::Fetching, Self::Swapping | Self::Failed(FailedStage::Fetch))
            | (Self::Swapping, Self::Invalidating | Self::Failed(FailedStage::Swap))
            | (Self::Invalidating, Self::HandoffPersisted | Self::Done)
            | (Self::HandoffPersisted | Self::Resumed, Self::Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    /// State left.
    pub from: WorkflowState,
    /// State entered.
    pub to: WorkflowState,
    /// When it happened.
    pub at: DateTime<Utc>,
    /// Optional note.
    pub detail: Option<String>,
}

/// In-memory progress record of one replacement run; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRun {
    id: Uuid,
    path: PathBuf,
    identity: Option<String>,
    started_at: DateTime<Utc>,
    state: WorkflowState,
    transitions: Vec<Transition>,
}

impl WorkflowRun {
    /// Fresh run in [`WorkflowState::Idle`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, identity: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            identity,
            started_at: Utc::now(),
            state: WorkflowState::Idle,
            transitions: Vec::new(),
        }
    }

    /// Run identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Path the run is about.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> WorkflowState {
        self.state
    }

    /// Recorded transitions, oldest first.
    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Sequence of states visited, starting with `Idle`.
    #[must_use]
    pub fn states(&self) -> Vec<WorkflowState> {
        std::iter::once(WorkflowState::Idle)
            .chain(self.transitions.iter().map(|transition| transition.to))
            .collect()
    }

    /// Move to `next`; illegal edges are logged and ignored.
    pub fn advance(&mut self, next: WorkflowState, detail: Option<String>) -> bool {
        if !self.state.can_advance_to(next) {
            warn!(
                run_id = %self.id,
                from = %self.state,
                to = %next,
                "ignoring illegal workflow transition"
            );
            return false;
        }
        self.transitions.push(Transition {
            from: self.state,
            to: next,
            at: Utc::now(),
            detail,
        });
        self.state = next;
        true
    }

    /// Log the full run once it has ended.
    pub fn log_summary(&self) {
        let states: Vec<&'static str> = self.states().into_iter().map(WorkflowState::as_str).collect();
        let elapsed_ms = (Utc::now() - self.started_at).num_milliseconds();
        info!(
            run_id = %self.id,
            path = %self.path.display(),
            identity = self.identity.as_deref().unwrap_or("-"),
            final_state = %self.state,
            states = ?states,
            elapsed_ms,
            "workflow run finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_edges_are_accepted() {
        let mut run = WorkflowRun::new("/lib/a.epub", Some("42".into()));
        for next in [
            WorkflowState::Detected,
            WorkflowState::Fetching,
            WorkflowState::Swapping,
            WorkflowState::Invalidating,
            WorkflowState::HandoffPersisted,
            WorkflowState::Done,
        ] {
            assert!(run.advance(next, None), "{next}");
        }
        assert!(run.state().is_terminal());
        assert_eq!(run.transitions().len(), 6);
    }

    #[test]
    fn illegal_edges_are_ignored() {
        let mut run = WorkflowRun::new("/lib/a.epub", None);
        assert!(!run.advance(WorkflowState::Swapping, None));
        assert_eq!(run.state(), WorkflowState::Idle);
        run.advance(WorkflowState::Detected, None);
        run.advance(WorkflowState::Fetching, None);
        assert!(run.advance(WorkflowState::Failed(FailedStage::Fetch), Some("404".into())));
        assert!(!run.advance(WorkflowState::Swapping, None));
        assert_eq!(
            run.states(),
            vec![
                WorkflowState::Idle,
                WorkflowState::Detected,
                WorkflowState::Fetching,
                WorkflowState::Failed(FailedStage::Fetch)
            ]
        );
    }

    #[test]
    fn resume_path_is_short() {
        let mut run = WorkflowRun::new("/lib", None);
        assert!(run.advance(WorkflowState::Resumed, None));
        assert!(run.advance(WorkflowState::Done, None));
    }
}
