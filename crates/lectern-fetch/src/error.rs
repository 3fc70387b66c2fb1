//! Errors raised while constructing a fetcher.

use thiserror::Error;

/// Result alias for fetcher construction.
pub type FetcherSetupResult<T> = Result<T, FetcherSetupError>;

/// Failure building an HTTP fetcher.
#[derive(Debug, Error)]
pub enum FetcherSetupError {
    /// No download URL template is configured.
    #[error("download url template not configured")]
    NotConfigured,
    /// The HTTP client could not be built.
    #[error("failed to build http client")]
    Client {
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
}
