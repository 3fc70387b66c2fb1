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

//! Shared model, error taxonomy and collaborator interfaces for the
//! placeholder replacement pipeline.

pub mod error;
pub mod model;
pub mod retry;
pub mod service;

pub use error::{
    CacheError, CacheResult, FetchError, FetchResult, NavigationError, NavigationResult,
    RestartError, RestartResult, SwapError, SwapResult,
};
pub use model::{ContentKey, FetchedArtifact, PlaceholderRecord, RestartTicket};
pub use retry::RetryPolicy;
pub use service::{CacheTarget, ContentFetcher, NavigationSink, RestartMechanism};
