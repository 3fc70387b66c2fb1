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

//! Placeholder replacement on the local filesystem.
//!
//! # Design
//! - Delete the stand-in first, with bounded retries on lock contention.
//! - Install the staged artifact by rename, copying across devices.
//! - A failure after the delete is a partial swap: the staged artifact is
//!   kept on disk and never cleaned up automatically.

pub mod ops;
pub mod replacer;

pub use ops::{FileOps, IoClass, TokioFileOps, classify_io};
pub use replacer::{FileReplacer, SwapOutcome, SwapStep, TransferMode};
