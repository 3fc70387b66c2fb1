//! Filesystem primitives used by the replacer.

use std::io::{self, ErrorKind};
use std::path::Path;

use async_trait::async_trait;
use tokio::fs;

/// Filesystem operations the replacer depends on.
#[async_trait]
pub trait FileOps: Send + Sync {
    /// Remove a single file.
    async fn remove_file(&self, path: &Path) -> io::Result<()>;
    /// Rename within a filesystem.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Copy file contents; returns bytes copied.
    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
    /// Create a directory and its parents.
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    /// Whether a regular file exists at `path`.
    async fn is_file(&self, path: &Path) -> bool;
}

/// [`FileOps`] backed by `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileOps;

#[async_trait]
impl FileOps for TokioFileOps {
    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path).await
    }

    async fn is_file(&self, path: &Path) -> bool {
        fs::metadata(path)
            .await
            .is_ok_and(|metadata| metadata.is_file())
    }
}

/// Coarse classification of an IO failure for swap decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoClass {
    /// Another process holds the file; worth retrying.
    Contention,
    /// The filesystem is out of space.
    Full,
    /// The file is already gone.
    Missing,
    /// Source and destination live on different filesystems.
    CrossDevice,
    /// Anything else.
    Other,
}

/// Classify an IO error.
#[must_use]
pub fn classify_io(err: &io::Error) -> IoClass {
    if is_sharing_violation(err) {
        return IoClass::Contention;
    }
    match err.kind() {
        ErrorKind::ResourceBusy | ErrorKind::WouldBlock => IoClass::Contention,
        ErrorKind::StorageFull | ErrorKind::QuotaExceeded => IoClass::Full,
        ErrorKind::NotFound => IoClass::Missing,
        ErrorKind::CrossesDevices => IoClass::CrossDevice,
        _ => IoClass::Other,
    }
}

#[cfg(windows)]
fn is_sharing_violation(err: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
    matches!(err.raw_os_error(), Some(32 | 33))
}

#[cfg(not(windows))]
fn is_sharing_violation(_err: &io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_covers_swap_relevant_kinds() {
        assert_eq!(
            classify_io(&io::Error::from(ErrorKind::ResourceBusy)),
            IoClass::Contention
        );
        assert_eq!(
            classify_io(&io::Error::from(ErrorKind::StorageFull)),
            IoClass::Full
        );
        assert_eq!(
            classify_io(&io::Error::from(ErrorKind::NotFound)),
            IoClass::Missing
        );
        assert_eq!(
            classify_io(&io::Error::from(ErrorKind::CrossesDevices)),
            IoClass::CrossDevice
        );
        assert_eq!(
            classify_io(&io::Error::from(ErrorKind::InvalidData)),
            IoClass::Other
        );
    }
}
