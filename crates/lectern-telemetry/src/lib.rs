#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Telemetry primitives shared across the Lectern workspace.
//!
//! `init` installs the stderr subscriber, `context` holds the per-invocation
//! span, and `metrics` owns the workflow counters.

pub mod context;
pub mod error;
pub mod init;
pub mod metrics;

pub use context::InvocationSpan;
pub use error::{Result, TelemetryError};
pub use init::{LogFormat, LoggingConfig, init_logging};
pub use metrics::{Metrics, MetricsSnapshot};
