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
#![allow(clippy::module_name_repetitions)]

//! State that crosses a process restart, and the means of restarting.
//!
//! The handoff record is the only durable state carried from one process to
//! the next. It is written just before a restart is requested and consumed
//! exactly once on the next start: every load deletes the file, whether the
//! record was fresh, stale, or unreadable.

pub mod error;
pub mod handoff;
pub mod restart;

pub use error::{HandoffError, HandoffRejection, HandoffResult};
pub use handoff::{
    HANDOFF_SCHEMA_VERSION, HANDOFF_TTL, HandoffLoad, RestartHandoff, RestartHandoffState,
};
pub use restart::{
    CommandRestart, SUPERVISOR_EXIT_CODE, SelfExecRestart, SupervisorRestart,
    mechanisms_from_settings,
};
