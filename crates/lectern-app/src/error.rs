//! # Design
//!
//! - Centralize application-level errors for bootstrap and the CLI edge.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Workflow failures are outcomes, not errors; only wiring problems land here.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: lectern_config::ConfigError,
    },
    /// Telemetry could not be set up.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: lectern_telemetry::TelemetryError,
    },
    /// The download executor could not be built.
    #[error("fetcher setup failed")]
    Fetcher {
        /// Operation identifier.
        operation: &'static str,
        /// Source setup error.
        source: lectern_fetch::FetcherSetupError,
    },
    /// A registry write failed.
    #[error("placeholder registry operation failed")]
    Registry {
        /// Operation identifier.
        operation: &'static str,
        /// Source registry error.
        source: lectern_registry::RegistryError,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: lectern_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: lectern_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn fetcher(
        operation: &'static str,
        source: lectern_fetch::FetcherSetupError,
    ) -> Self {
        Self::Fetcher { operation, source }
    }

    /// Wrap a registry failure.
    #[must_use]
    pub const fn registry(
        operation: &'static str,
        source: lectern_registry::RegistryError,
    ) -> Self {
        Self::Registry { operation, source }
    }
}
