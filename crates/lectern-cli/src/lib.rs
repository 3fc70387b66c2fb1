#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::redundant_pub_crate)]

//! Command-line front end for the Lectern placeholder workflow.
//!
//! Layout:
//! - `cli.rs`: argument parsing, logging setup and dispatch
//! - `commands.rs`: one handler per subcommand
//! - `error.rs`: CLI errors and exit codes
//! - `output.rs`: renderers for outcomes, reports and notices
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod cli;
pub(crate) mod commands;
pub(crate) mod error;
pub(crate) mod output;

pub use cli::run;
