//! Error types for the placeholder registry.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors produced by the placeholder registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Filesystem access failed.
    #[error("registry io failure")]
    Io {
        /// Operation that failed.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Encoding or decoding the store failed.
    #[error("registry json failure")]
    Json {
        /// Operation that failed.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The store could not be loaded at startup; writes are refused.
    #[error("registry store unavailable")]
    Unavailable {
        /// Store location.
        path: PathBuf,
    },
    /// A real file already occupies the requested stand-in location.
    #[error("refusing to replace real content with a placeholder")]
    RealContent {
        /// Occupied path.
        path: PathBuf,
    },
}

impl RegistryError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: serde_json::Error,
    ) -> Self {
        Self::Json {
            operation,
            path: path.into(),
            source,
        }
    }
}
