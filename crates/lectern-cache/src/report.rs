//! Per-target invalidation results.

use serde::Serialize;

/// Why one target could not be invalidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationFailure {
    /// Target name.
    pub target: String,
    /// Human-readable reason.
    pub message: String,
}

/// Result for a single target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetOutcome {
    /// Entries were dropped (possibly zero).
    Invalidated {
        /// Number of entries removed.
        entries: usize,
    },
    /// The target was not present in this process.
    Skipped,
    /// The target errored or panicked.
    Failed(InvalidationFailure),
}

impl TargetOutcome {
    /// Metrics label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Invalidated { .. } => "invalidated",
            Self::Skipped => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}

/// Result for a named target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    /// Target name.
    pub target: String,
    /// What happened.
    pub outcome: TargetOutcome,
}

/// Aggregate result of one invalidation pass, in target order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    /// One entry per registered target.
    pub targets: Vec<TargetReport>,
}

impl InvalidationReport {
    fn names_with(&self, label: &str) -> Vec<String> {
        self.targets
            .iter()
            .filter(|report| report.outcome.label() == label)
            .map(|report| report.target.clone())
            .collect()
    }

    /// Targets that were invalidated.
    #[must_use]
    pub fn invalidated(&self) -> Vec<String> {
        self.names_with("invalidated")
    }

    /// Targets that were absent.
    #[must_use]
    pub fn skipped(&self) -> Vec<String> {
        self.names_with("skipped")
    }

    /// Targets that failed.
    #[must_use]
    pub fn failed(&self) -> Vec<String> {
        self.names_with("failed")
    }

    /// Failure details.
    #[must_use]
    pub fn failures(&self) -> Vec<&InvalidationFailure> {
        self.targets
            .iter()
            .filter_map(|report| match &report.outcome {
                TargetOutcome::Failed(failure) => Some(failure),
                _ => None,
            })
            .collect()
    }

    /// Outcome for a named target.
    #[must_use]
    pub fn outcome_for(&self, target: &str) -> Option<&TargetOutcome> {
        self.targets
            .iter()
            .find(|report| report.target == target)
            .map(|report| &report.outcome)
    }
}
