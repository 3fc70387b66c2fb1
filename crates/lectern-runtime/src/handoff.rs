//! Durable, single-consumption restart handoff record.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lectern_core::{RestartMechanism, RestartTicket};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::error::{HandoffError, HandoffRejection, HandoffResult};

/// Window in which a saved record may still be consumed.
pub const HANDOFF_TTL: Duration = Duration::from_secs(60);

/// Schema version written by this build.
pub const HANDOFF_SCHEMA_VERSION: u32 = 1;

/// Where the UI should resume after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartHandoffState {
    /// Folder containing the newly installed content.
    pub folder_path: PathBuf,
    /// The content itself, when known.
    #[serde(default)]
    pub book_path: Option<PathBuf>,
    /// Seconds since the Unix epoch when the record was written.
    pub timestamp: i64,
    /// Record schema version.
    pub schema_version: u32,
}

impl RestartHandoffState {
    /// Record stamped with the current time and schema version.
    #[must_use]
    pub fn new(folder_path: impl Into<PathBuf>, book_path: Option<PathBuf>) -> Self {
        Self {
            folder_path: folder_path.into(),
            book_path,
            timestamp: Utc::now().timestamp(),
            schema_version: HANDOFF_SCHEMA_VERSION,
        }
    }

    /// Signed age of the record relative to `now` (seconds since epoch).
    #[must_use]
    pub const fn age_at(&self, now: i64) -> i64 {
        now.saturating_sub(self.timestamp)
    }
}

/// Result of consuming the handoff record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffLoad {
    /// No record was present.
    Absent,
    /// A fresh record was consumed.
    Consumed(RestartHandoffState),
    /// A record was present but discarded.
    Rejected(HandoffRejection),
}

impl HandoffLoad {
    /// The consumed state, if any.
    #[must_use]
    pub fn into_state(self) -> Option<RestartHandoffState> {
        match self {
            Self::Consumed(state) => Some(state),
            Self::Absent | Self::Rejected(_) => None,
        }
    }

    /// Metrics label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Consumed(_) => "consumed",
            Self::Rejected(rejection) => rejection.label(),
        }
    }
}

/// Owner of the handoff file and the ordered restart mechanisms.
#[derive(Clone)]
pub struct RestartHandoff {
    path: PathBuf,
    ttl: Duration,
    mechanisms: Vec<Arc<dyn RestartMechanism>>,
}

impl std::fmt::Debug for RestartHandoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartHandoff")
            .field("path", &self.path)
            .field("ttl", &self.ttl)
            .field("mechanisms", &self.mechanism_names())
            .finish()
    }
}

impl RestartHandoff {
    /// Handoff stored at `path` with restart mechanisms in priority order.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, mechanisms: Vec<Arc<dyn RestartMechanism>>) -> Self {
        Self {
            path: path.into(),
            ttl: HANDOFF_TTL,
            mechanisms,
        }
    }

    /// Fixed location of the record.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of the configured mechanisms, in priority order.
    #[must_use]
    pub fn mechanism_names(&self) -> Vec<String> {
        self.mechanisms
            .iter()
            .map(|mechanism| mechanism.name().to_string())
            .collect()
    }

    /// Whether any restart mechanism reports itself usable.
    #[must_use]
    pub fn restart_available(&self) -> bool {
        self.mechanisms.iter().any(|mechanism| mechanism.available())
    }

    /// Persist `state`, replacing any earlier record.
    ///
    /// # Errors
    ///
    /// Returns an error when the record cannot be encoded or written.
    pub async fn save(&self, state: &RestartHandoffState) -> HandoffResult<()> {
        let body = serde_json::to_vec_pretty(state).map_err(|source| HandoffError::Json {
            operation: "handoff.serialize",
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| HandoffError::io("handoff.create_dir", parent, err))?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, body)
            .await
            .map_err(|err| HandoffError::io("handoff.write", &tmp_path, err))?;
        if let Err(err) = fs::rename(&tmp_path, &self.path).await {
            if let Err(cleanup) = fs::remove_file(&tmp_path).await {
                warn!(
                    error = %cleanup,
                    path = %tmp_path.display(),
                    "failed to remove handoff temp file"
                );
            }
            return Err(HandoffError::io("handoff.rename", &self.path, err));
        }
        info!(
            path = %self.path.display(),
            folder = %state.folder_path.display(),
            "restart handoff saved"
        );
        Ok(())
    }

    /// Consume the record, returning its state only when fresh.
    pub async fn load(&self) -> Option<RestartHandoffState> {
        self.consume().await.into_state()
    }

    /// Consume the record and report what was found.
    ///
    /// Any record present is deleted before this returns, whatever its
    /// contents, so a second call always yields [`HandoffLoad::Absent`].
    pub async fn consume(&self) -> HandoffLoad {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return HandoffLoad::Absent,
            Err(err) => {
                self.discard().await;
                return self.reject(HandoffRejection::Unreadable {
                    detail: err.to_string(),
                });
            }
        };
        self.discard().await;

        match self.evaluate(&raw, Utc::now().timestamp()) {
            Ok(state) => {
                info!(folder = %state.folder_path.display(), "restart handoff consumed");
                HandoffLoad::Consumed(state)
            }
            Err(rejection) => self.reject(rejection),
        }
    }

    /// Delete the record; missing records are fine.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing record cannot be removed.
    pub async fn clear(&self) -> HandoffResult<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "restart handoff cleared");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(HandoffError::io("handoff.clear", &self.path, err)),
        }
    }

    /// Ask the first usable mechanism to restart the process.
    ///
    /// Returns `None` when no mechanism is available or every one failed;
    /// that is an expected condition and the caller falls back to staying
    /// in-process.
    pub async fn request_restart(&self) -> Option<RestartTicket> {
        for mechanism in &self.mechanisms {
            if !mechanism.available() {
                debug!(mechanism = mechanism.name(), "restart mechanism unavailable");
                continue;
            }
            match mechanism.restart().await {
                Ok(ticket) => {
                    info!(
                        mechanism = %ticket.mechanism,
                        exit_code = ticket.exit_code,
                        "restart requested"
                    );
                    return Some(ticket);
                }
                Err(err) => {
                    warn!(
                        mechanism = mechanism.name(),
                        error = %err,
                        "restart mechanism failed; trying next"
                    );
                }
            }
        }
        info!("no restart mechanism accepted the request");
        None
    }

    /// Whether the record location looks writable, without writing anything.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub async fn probe_writable(&self) -> Result<(), String> {
        let Some(mut dir) = self.path.parent().map(Path::to_path_buf) else {
            return Err("handoff path has no parent directory".to_string());
        };
        loop {
            match fs::metadata(&dir).await {
                Ok(metadata) if !metadata.is_dir() => {
                    return Err(format!("{} is not a directory", dir.display()));
                }
                Ok(metadata) if metadata.permissions().readonly() => {
                    return Err(format!("{} is read-only", dir.display()));
                }
                Ok(_) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    if !dir.pop() || dir.as_os_str().is_empty() {
                        return Err("no existing ancestor directory".to_string());
                    }
                }
                Err(err) => return Err(format!("{}: {err}", dir.display())),
            }
        }
    }

    fn evaluate(&self, raw: &[u8], now: i64) -> Result<RestartHandoffState, HandoffRejection> {
        let value: Value = serde_json::from_slice(raw).map_err(|err| HandoffRejection::Unreadable {
            detail: err.to_string(),
        })?;
        let version = value
            .get("schemaVersion")
            .and_then(Value::as_i64)
            .ok_or_else(|| HandoffRejection::Unreadable {
                detail: "schemaVersion missing".to_string(),
            })?;
        if version != i64::from(HANDOFF_SCHEMA_VERSION) {
            return Err(HandoffRejection::UnsupportedSchema { version });
        }
        let state: RestartHandoffState =
            serde_json::from_value(value).map_err(|err| HandoffRejection::Unreadable {
                detail: err.to_string(),
            })?;
        let age = state.age_at(now);
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        if age > ttl || age < -ttl {
            return Err(HandoffRejection::Stale { age_secs: age });
        }
        Ok(state)
    }

    fn reject(&self, rejection: HandoffRejection) -> HandoffLoad {
        debug!(
            path = %self.path.display(),
            reason = rejection.label(),
            detail = %rejection,
            "restart handoff discarded"
        );
        HandoffLoad::Rejected(rejection)
    }

    async fn discard(&self) {
        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => error!(
                error = %err,
                path = %self.path.display(),
                "failed to delete consumed restart handoff"
            ),
        }
    }
}
