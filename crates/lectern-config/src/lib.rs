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

//! Environment-driven configuration for Lectern.
//!
//! Layout: `model.rs` (typed settings), `defaults.rs` (fixed names and
//! fallbacks), `validate.rs` (parsing helpers), `loader.rs` (environment
//! lookup), `error.rs` (error types).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use model::{
    CacheTargetKind, CacheTargetSpec, FetchSettings, LecternConfig, LoggingSettings,
    RestartSettings, SwapSettings,
};
