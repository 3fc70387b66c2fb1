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

//! Download executor that stages catalog content over HTTP.

pub mod error;
pub mod http;

pub use error::{FetcherSetupError, FetcherSetupResult};
pub use http::{HttpFetcher, USER_AGENT};
