//! Default values and fixed file names.
//!
//! # Design
//! - File names under the state directory are fixed so a restarted process
//!   finds the handoff record without any other input.

use std::time::Duration;

/// Directory created under the library root when `LECTERN_STATE_DIR` is unset.
pub const STATE_DIR_NAME: &str = ".lectern";
/// Directory created under the system temp dir when `LECTERN_TEMP_DIR` is unset.
pub const STAGING_DIR_NAME: &str = "lectern-staging";
/// Placeholder registry file inside the state directory.
pub const REGISTRY_FILE_NAME: &str = "placeholders.json";
/// Restart handoff file inside the state directory.
pub const HANDOFF_FILE_NAME: &str = "restart-handoff.json";
/// Placeholder token substituted into the fetch URL template.
pub const IDENTITY_TOKEN: &str = "{identity}";
/// Default per-request fetch timeout.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Fetch retries after the first attempt.
pub const FETCH_RETRIES: u32 = 1;
/// Delete retries on lock contention.
pub const SWAP_RETRIES: u32 = 3;
/// Initial backoff between delete attempts.
pub const SWAP_BACKOFF: Duration = Duration::from_millis(100);
/// Default log level.
pub const LOG_LEVEL: &str = "info";
