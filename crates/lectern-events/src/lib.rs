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

//! Event bus for the Lectern placeholder workflow.
//!
//! The bus carries stage-tagged workflow diagnostics and user-facing notices.
//! It keeps a bounded replay buffer so a caller that only inspects the outcome
//! after a run (the CLI) can still print every notice produced during it.
//! Internally it uses `tokio::broadcast`; when the channel overflows, the
//! oldest events are dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::error;
use uuid::Uuid;

/// Identifier assigned to each event emitted by the workflow.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 256;

/// Typed events surfaced by the placeholder workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A placeholder was detected on open and a run started.
    WorkflowStarted {
        /// Identifier of the run.
        run_id: Uuid,
        /// Placeholder path that was opened.
        path: String,
        /// Catalog identity of the content.
        identity: String,
    },
    /// The run entered a new stage.
    StageEntered {
        /// Identifier of the run.
        run_id: Uuid,
        /// Stage label.
        stage: String,
    },
    /// A transient fetch failure is being retried.
    FetchRetried {
        /// Identifier of the run.
        run_id: Uuid,
        /// Attempt number that failed (1-based).
        attempt: u32,
        /// Failure detail.
        message: String,
    },
    /// The run terminated in a failed stage.
    WorkflowFailed {
        /// Identifier of the run.
        run_id: Uuid,
        /// Stage tag (`fetch` or `swap`).
        stage: String,
        /// Failure detail.
        message: String,
    },
    /// The placeholder was deleted but the fetched artifact could not be installed.
    SwapIncomplete {
        /// Identifier of the run.
        run_id: Uuid,
        /// Path where neither placeholder nor content now exists.
        path: String,
        /// Temp file kept on disk for manual recovery.
        retained_temp: String,
    },
    /// Collaborator caches were invalidated.
    CacheInvalidated {
        /// Identifier of the run.
        run_id: Uuid,
        /// Targets that dropped entries.
        invalidated: Vec<String>,
        /// Targets that were not present.
        skipped: Vec<String>,
        /// Targets that failed.
        failed: Vec<String>,
    },
    /// The restart handoff record was written.
    HandoffPersisted {
        /// Identifier of the run.
        run_id: Uuid,
        /// Folder the next process should navigate to.
        folder: String,
    },
    /// A restart mechanism accepted the restart request.
    RestartRequested {
        /// Identifier of the run.
        run_id: Uuid,
        /// Name of the mechanism that accepted.
        mechanism: String,
    },
    /// No restart mechanism was available; the run falls back to an in-process open.
    RestartUnavailable {
        /// Identifier of the run.
        run_id: Uuid,
    },
    /// The content was opened in the current process.
    OpenedInProcess {
        /// Identifier of the run.
        run_id: Uuid,
        /// Path that was opened.
        path: String,
    },
    /// A pending handoff was consumed after a restart.
    Resumed {
        /// Folder navigated to.
        folder: String,
    },
    /// Message intended for the user.
    Notice {
        /// Severity of the notice.
        severity: NoticeSeverity,
        /// Human-readable message.
        message: String,
    },
    /// Health probe results changed.
    HealthChanged {
        /// Names of failing probes.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator for log filtering.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow_started",
            Self::StageEntered { .. } => "stage_entered",
            Self::FetchRetried { .. } => "fetch_retried",
            Self::WorkflowFailed { .. } => "workflow_failed",
            Self::SwapIncomplete { .. } => "swap_incomplete",
            Self::CacheInvalidated { .. } => "cache_invalidated",
            Self::HandoffPersisted { .. } => "handoff_persisted",
            Self::RestartRequested { .. } => "restart_requested",
            Self::RestartUnavailable { .. } => "restart_unavailable",
            Self::OpenedInProcess { .. } => "opened_in_process",
            Self::Resumed { .. } => "resumed",
            Self::Notice { .. } => "notice",
            Self::HealthChanged { .. } => "health_changed",
        }
    }

    /// Run identifier carried by the event, if any.
    #[must_use]
    pub const fn run_id(&self) -> Option<Uuid> {
        match self {
            Self::WorkflowStarted { run_id, .. }
            | Self::StageEntered { run_id, .. }
            | Self::FetchRetried { run_id, .. }
            | Self::WorkflowFailed { run_id, .. }
            | Self::SwapIncomplete { run_id, .. }
            | Self::CacheInvalidated { run_id, .. }
            | Self::HandoffPersisted { run_id, .. }
            | Self::RestartRequested { run_id, .. }
            | Self::RestartUnavailable { run_id }
            | Self::OpenedInProcess { run_id, .. } => Some(*run_id),
            Self::Resumed { .. } | Self::Notice { .. } | Self::HealthChanged { .. } => None,
        }
    }
}

/// Severity attached to user-facing notices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSeverity {
    /// Informational message.
    Info,
    /// Something the user should look at, nothing was lost.
    Warning,
    /// The requested operation failed.
    Error,
}

impl NoticeSeverity {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Metadata wrapper around events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Payload.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided capacity.
    ///
    /// A zero capacity is bumped to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish an event, assigning it a sequential identifier.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        // No live subscribers is fine; the replay buffer still holds the event.
        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying buffered events newer than `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let backlog = since_id.map_or_else(VecDeque::new, |since| {
            self.backlog(since).into_iter().collect()
        });
        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Snapshot of buffered events newer than `since_id`.
    #[must_use]
    pub fn backlog(&self, since_id: EventId) -> Vec<EventEnvelope> {
        self.lock_buffer()
            .iter()
            .filter(|item| item.id > since_id)
            .cloned()
            .collect()
    }

    /// Returns the last assigned identifier, if any events are buffered.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock_buffer().back().map(|event| event.id)
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("event buffer mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events from the replay backlog first, then live.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => self.receiver.recv().await.ok(),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
