//! Error types for handoff persistence.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for handoff operations.
pub type HandoffResult<T> = Result<T, HandoffError>;

/// Failure writing or clearing the handoff record.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// Filesystem access failed.
    #[error("handoff io failure")]
    Io {
        /// Operation that failed.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Encoding the record failed.
    #[error("handoff json failure")]
    Json {
        /// Operation that failed.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl HandoffError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Reason a present handoff record was discarded instead of consumed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoffRejection {
    /// Written outside the consumption window.
    #[error("handoff record is stale")]
    Stale {
        /// Seconds between the record timestamp and now; negative when the
        /// record claims to come from the future.
        age_secs: i64,
    },
    /// Could not be read or parsed.
    #[error("handoff record is unreadable")]
    Unreadable {
        /// Human-readable detail.
        detail: String,
    },
    /// Written by an unknown schema version.
    #[error("handoff record has an unsupported schema version")]
    UnsupportedSchema {
        /// Version found in the record.
        version: i64,
    },
}

impl HandoffRejection {
    /// Metrics label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Stale { .. } => "stale",
            Self::Unreadable { .. } => "unreadable",
            Self::UnsupportedSchema { .. } => "unsupported_schema",
        }
    }
}
