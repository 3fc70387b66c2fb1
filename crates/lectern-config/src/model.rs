//! Typed configuration models.
//!
//! # Design
//! - Pure data carriers; parsing lives in `loader.rs` and `validate.rs`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults::{HANDOFF_FILE_NAME, REGISTRY_FILE_NAME};

/// Fully resolved configuration for a Lectern process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LecternConfig {
    /// Root of the content tree that placeholders and real files live in.
    pub library_root: PathBuf,
    /// Directory holding the placeholder registry and the handoff record.
    pub state_dir: PathBuf,
    /// Staging directory for fetched artifacts; never inside `library_root`.
    pub temp_dir: PathBuf,
    /// Download settings.
    pub fetch: FetchSettings,
    /// File replacement settings.
    pub swap: SwapSettings,
    /// Collaborator caches to invalidate after a swap, in invocation order.
    pub cache_targets: Vec<CacheTargetSpec>,
    /// Restart mechanism settings.
    pub restart: RestartSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl LecternConfig {
    /// Location of the durable placeholder registry.
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.state_dir.join(REGISTRY_FILE_NAME)
    }

    /// Fixed, well-known location of the restart handoff record.
    #[must_use]
    pub fn handoff_path(&self) -> PathBuf {
        self.state_dir.join(HANDOFF_FILE_NAME)
    }
}

/// Download settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSettings {
    /// URL template containing `{identity}`; `None` disables fetching.
    pub url_template: Option<String>,
    /// Basic-auth user name.
    pub username: Option<String>,
    /// Basic-auth password.
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries after the first attempt for transient failures.
    pub retries: u32,
}

/// File replacement settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSettings {
    /// Delete retries after the first attempt when the placeholder is locked.
    pub retries: u32,
    /// Initial backoff between attempts; doubles each retry.
    pub backoff: Duration,
}

/// Kind of built-in cache target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTargetKind {
    /// Directory of derived files named after the content (covers, thumbnails).
    Directory,
    /// JSON object keyed by content path or file name (metadata, listings).
    Index,
}

impl CacheTargetKind {
    /// Short name used in `LECTERN_CACHE_TARGETS`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Directory => "dir",
            Self::Index => "index",
        }
    }
}

/// A configured cache collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTargetSpec {
    /// Stable name used in logs and reports.
    pub name: String,
    /// Target kind.
    pub kind: CacheTargetKind,
    /// Directory or index file location.
    pub path: PathBuf,
}

/// Restart mechanism settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartSettings {
    /// A supervisor restarts the process when it exits with the restart code.
    pub supervised: bool,
    /// Explicit command spawned to restart the host.
    pub command: Option<Vec<String>>,
    /// Re-executing the current binary is allowed.
    pub self_exec: bool,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Level passed to the env filter when `RUST_LOG` is unset.
    pub level: String,
    /// Requested format (`json` / `pretty`); `None` lets telemetry infer it.
    pub format: Option<String>,
}

/// Returns `true` when `candidate` lies inside `root` after lexical normalisation.
#[must_use]
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    let root = crate::validate::normalize(root);
    let candidate = crate::validate::normalize(candidate);
    candidate.starts_with(root)
}
