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

//! Best-effort invalidation of collaborator caches after a swap.
//!
//! Targets are registered explicitly at startup. Each one is probed and
//! invoked in isolation, so a missing, failing or panicking cache never keeps
//! the others from running and never fails the caller.

pub mod coordinator;
pub mod report;
pub mod targets;

pub use coordinator::CacheInvalidationCoordinator;
pub use report::{InvalidationFailure, InvalidationReport, TargetOutcome, TargetReport};
pub use targets::{DirectoryCacheTarget, IndexCacheTarget, build_target};
