//! Subscriber installation for the `lectern` binary.
//!
//! Output always goes to stderr so stdout stays reserved for command results
//! (listings, JSON reports, metrics exposition).

use std::io::{self, IsTerminal};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{Result, TelemetryError};

/// Shape of log lines on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, span fields flattened in.
    Json,
    /// Multi-field human output with timestamps.
    Pretty,
    /// Single-line output without timestamps.
    Compact,
}

impl LogFormat {
    /// Resolve the `LECTERN_LOG_FORMAT` value. Unset or unrecognised values
    /// pick `Pretty` on an interactive stderr and `Json` otherwise.
    #[must_use]
    pub fn resolve(name: Option<&str>) -> Self {
        match name.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => Self::Json,
            Some("pretty" | "text") => Self::Pretty,
            Some("compact") => Self::Compact,
            _ if io::stderr().is_terminal() => Self::Pretty,
            _ => Self::Json,
        }
    }
}

/// Inputs to [`init_logging`].
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Filter directives, e.g. `info` or `lectern_fetch=debug,info`.
    pub filter: &'a str,
    /// Line format.
    pub format: LogFormat,
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails when the filter directives do not parse or a subscriber is already
/// installed.
pub fn init_logging(config: &LoggingConfig<'_>) -> Result<()> {
    let filter = build_filter(config.filter)?;
    tracing_subscriber::registry()
        .with(output_layer(config.format).with_filter(filter))
        .try_init()
        .map_err(|source| TelemetryError::AlreadyInstalled { source })
}

fn build_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse(directives)
        .map_err(|source| TelemetryError::InvalidFilter {
            directives: directives.to_string(),
            source,
        })
}

fn output_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .without_time()
            .with_target(false)
            .with_writer(io::stderr)
            .boxed(),
    }
}
