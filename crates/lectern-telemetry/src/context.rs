//! Span covering one CLI invocation.

use tracing::span::EnteredSpan;
use uuid::Uuid;

/// Keeps the invocation span entered until dropped, so every event emitted
/// while a command runs carries `command` and `invocation_id`.
pub struct InvocationSpan {
    invocation_id: Uuid,
    _entered: EnteredSpan,
}

impl InvocationSpan {
    /// Open and enter the span for `command`.
    #[must_use]
    pub fn enter(command: &'static str) -> Self {
        let invocation_id = Uuid::new_v4();
        let entered = tracing::info_span!(
            "lectern",
            command,
            %invocation_id,
            version = env!("CARGO_PKG_VERSION"),
        )
        .entered();
        Self {
            invocation_id,
            _entered: entered,
        }
    }

    /// Identifier stamped on this invocation's log lines.
    #[must_use]
    pub const fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }
}
