//! Error types for telemetry operations.

use prometheus::Error as PrometheusError;
use thiserror::Error;
use tracing_subscriber::filter::ParseError;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised while installing logging or managing metrics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// `LECTERN_LOG_LEVEL` held directives the filter could not parse.
    #[error("invalid log filter")]
    InvalidFilter {
        /// Directives as configured.
        directives: String,
        /// Parser failure.
        #[source]
        source: ParseError,
    },
    /// A global subscriber was already installed.
    #[error("logging already initialised")]
    AlreadyInstalled {
        /// Underlying install failure.
        #[source]
        source: tracing_subscriber::util::TryInitError,
    },
    /// Constructing a workflow counter failed.
    #[error("failed to build metric")]
    MetricBuild {
        /// Metric name.
        name: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// Adding a workflow counter to the registry failed.
    #[error("failed to register metric")]
    MetricRegister {
        /// Metric name.
        name: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// Producing the text exposition failed.
    #[error("failed to render metrics")]
    Render {
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// The text exposition was not UTF-8.
    #[error("rendered metrics were not utf-8")]
    RenderUtf8 {
        /// Conversion failure.
        #[source]
        source: std::string::FromUtf8Error,
    },
}
