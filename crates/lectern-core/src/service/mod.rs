//! Interfaces implemented by pipeline collaborators.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{CacheResult, FetchResult, NavigationResult, RestartResult};
use crate::model::{FetchedArtifact, RestartTicket};

/// Fetches the real artifact for a content identity into a staging area.
///
/// Implementations do not retry; the orchestrator owns the retry policy.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Download the content for `identity` to a temporary file outside the content tree.
    async fn fetch(&self, identity: &str) -> FetchResult<FetchedArtifact>;

    /// Check that fetching could work right now without downloading anything.
    async fn preflight(&self) -> FetchResult<()> {
        Ok(())
    }
}

/// One optional cache that holds state derived from content paths.
#[async_trait]
pub trait CacheTarget: Send + Sync {
    /// Stable name used in reports and logs.
    fn name(&self) -> &str;

    /// Whether the cache is present in this process.
    async fn probe(&self) -> bool;

    /// Drop entries derived from `old_path` or `new_path`; returns how many went.
    async fn invalidate(&self, old_path: &Path, new_path: &Path) -> CacheResult<usize>;
}

/// Host-provided way of restarting the process.
#[async_trait]
pub trait RestartMechanism: Send + Sync {
    /// Name used in logs and tickets.
    fn name(&self) -> &str;

    /// Whether the mechanism can be used in this environment.
    fn available(&self) -> bool;

    /// Ask the host to restart.
    async fn restart(&self) -> RestartResult<RestartTicket>;
}

/// Where the UI goes after a swap or a restart.
#[async_trait]
pub trait NavigationSink: Send + Sync {
    /// Show the contents of `folder`.
    async fn navigate(&self, folder: &Path) -> NavigationResult<()>;

    /// Open a piece of content directly.
    async fn open_content(&self, path: &Path) -> NavigationResult<()>;

    /// Whether the sink could accept navigation right now.
    async fn target_available(&self) -> bool {
        true
    }
}
