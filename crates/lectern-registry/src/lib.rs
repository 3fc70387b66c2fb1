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

//! Durable registry of placeholder stand-ins.
//!
//! # Design
//! - The registry is the only authority on whether a path holds a stand-in.
//! - Backed by a single JSON document written atomically (temp file + rename).
//! - A store that cannot be read degrades to "nothing is a placeholder" and
//!   refuses writes until it is repaired, so a corrupt file is never clobbered.

pub mod error;
pub mod registry;
mod store;

pub use error::{RegistryError, RegistryResult};
pub use registry::{PLACEHOLDER_STUB_MARKER, PlaceholderRegistry};
