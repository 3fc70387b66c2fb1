//! Error types shared by pipeline stages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure while fetching content for a placeholder.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Failure that may succeed on a later attempt (timeouts, resets, 5xx).
    #[error("transient fetch failure")]
    Transient {
        /// Content identity being fetched.
        identity: String,
        /// Human-readable detail.
        detail: String,
    },
    /// Failure that will not succeed on retry (auth, not found, bad payload).
    #[error("permanent fetch failure")]
    Permanent {
        /// Content identity being fetched.
        identity: String,
        /// Human-readable detail.
        detail: String,
    },
}

impl FetchError {
    /// Construct a transient failure.
    #[must_use]
    pub fn transient(identity: &str, detail: impl Into<String>) -> Self {
        Self::Transient {
            identity: identity.to_string(),
            detail: detail.into(),
        }
    }

    /// Construct a permanent failure.
    #[must_use]
    pub fn permanent(identity: &str, detail: impl Into<String>) -> Self {
        Self::Permanent {
            identity: identity.to_string(),
            detail: detail.into(),
        }
    }

    /// Whether a retry is worthwhile.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Detail string for diagnostics and user notices.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Transient { detail, .. } | Self::Permanent { detail, .. } => detail,
        }
    }
}

/// Convenience alias for fetch results.
pub type FetchResult<T> = Result<T, FetchError>;

/// Failure while replacing a placeholder with fetched content.
#[derive(Debug, Error)]
pub enum SwapError {
    /// The placeholder stayed locked after every delete attempt.
    #[error("placeholder is locked")]
    LockContention {
        /// Placeholder path.
        path: PathBuf,
        /// Attempts made before giving up.
        attempts: u32,
        /// Last underlying failure.
        #[source]
        source: io::Error,
    },
    /// The filesystem ran out of space.
    #[error("filesystem is full")]
    FilesystemFull {
        /// Path being written.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// Any other filesystem failure before the placeholder was removed.
    #[error("swap failed")]
    Permanent {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The placeholder is gone but the content could not be installed.
    #[error("placeholder removed but content was not installed")]
    PartialSwap {
        /// Final content path, currently empty.
        final_path: PathBuf,
        /// Fetched artifact, kept for manual recovery.
        retained_temp: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}

impl SwapError {
    /// Short stage-local label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LockContention { .. } => "lock_contention",
            Self::FilesystemFull { .. } => "filesystem_full",
            Self::Permanent { .. } => "permanent",
            Self::PartialSwap { .. } => "partial_swap",
        }
    }

    /// Whether the swap left neither placeholder nor content on disk.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        matches!(self, Self::PartialSwap { .. })
    }
}

/// Convenience alias for swap results.
pub type SwapResult<T> = Result<T, SwapError>;

/// Failure reported by a single cache collaborator.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem access failed.
    #[error("cache io failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The cache contents were not in the expected shape.
    #[error("cache contents invalid")]
    Invalid {
        /// Path of the cache store.
        path: PathBuf,
        /// Human-readable detail.
        detail: String,
    },
    /// Collaborator-specific failure.
    #[error("cache collaborator failed")]
    Collaborator {
        /// Human-readable detail.
        detail: String,
    },
}

impl CacheError {
    /// Helper for IO failures with context.
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias for cache results.
pub type CacheResult<T> = Result<T, CacheError>;

/// Failure while requesting a process restart.
#[derive(Debug, Error)]
pub enum RestartError {
    /// No restart mechanism is available in this environment.
    #[error("restart unavailable")]
    Unavailable,
    /// A mechanism was available but could not be started.
    #[error("restart mechanism failed")]
    Spawn {
        /// Mechanism name.
        mechanism: String,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}

/// Convenience alias for restart results.
pub type RestartResult<T> = Result<T, RestartError>;

/// Failure while sending the UI somewhere.
#[derive(Debug, Error)]
pub enum NavigationError {
    /// The requested folder or file does not exist.
    #[error("navigation target missing")]
    TargetMissing {
        /// Requested path.
        path: PathBuf,
    },
    /// Any other failure reported by the sink.
    #[error("navigation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Requested path.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}

/// Convenience alias for navigation results.
pub type NavigationResult<T> = Result<T, NavigationError>;
