//! Swap a registered stand-in for its fetched content.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lectern_core::{RetryPolicy, SwapError, SwapResult};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::ops::{FileOps, IoClass, TokioFileOps, classify_io};

/// Discrete steps of a swap, used in logs and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStep {
    /// Confirm the staged artifact and destination directory.
    Prepare,
    /// Delete the stand-in.
    RemovePlaceholder,
    /// Move the staged artifact into place.
    InstallContent,
}

impl SwapStep {
    /// Stable identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::RemovePlaceholder => "remove_placeholder",
            Self::InstallContent => "install_content",
        }
    }
}

/// How the staged artifact reached its final path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Same-filesystem rename.
    Renamed,
    /// Copy followed by removal of the staged file.
    Copied,
}

/// Summary of a completed swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapOutcome {
    /// Attempts needed to delete the stand-in.
    pub delete_attempts: u32,
    /// Whether the stand-in was already gone before the swap.
    pub placeholder_was_missing: bool,
    /// Transfer strategy used.
    pub transfer: TransferMode,
    /// Where the content now lives.
    pub final_path: PathBuf,
}

/// Deletes stand-ins and installs fetched artifacts in their place.
#[derive(Clone)]
pub struct FileReplacer {
    ops: Arc<dyn FileOps>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for FileReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReplacer")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl FileReplacer {
    /// Replacer over the real filesystem.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_ops(Arc::new(TokioFileOps), policy)
    }

    /// Replacer over custom filesystem primitives.
    #[must_use]
    pub fn with_ops(ops: Arc<dyn FileOps>, policy: RetryPolicy) -> Self {
        Self { ops, policy }
    }

    /// Retry policy applied to placeholder deletion.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Delete `placeholder` and install `temp` at `final_path`.
    ///
    /// A stand-in that is already missing counts as deleted, which lets a
    /// previously interrupted swap finish on the next attempt.
    ///
    /// # Errors
    ///
    /// - [`SwapError::LockContention`] when the stand-in stays locked.
    /// - [`SwapError::FilesystemFull`] when the destination has no room.
    /// - [`SwapError::Permanent`] for other failures before the delete.
    /// - [`SwapError::PartialSwap`] when the delete succeeded but the install
    ///   did not; `temp` is left on disk.
    pub async fn swap(
        &self,
        placeholder: &Path,
        temp: &Path,
        final_path: &Path,
    ) -> SwapResult<SwapOutcome> {
        self.prepare(temp, final_path).await?;
        let (delete_attempts, placeholder_was_missing) = self.remove_placeholder(placeholder).await?;
        let transfer = self.install(temp, final_path).await?;
        info!(
            placeholder = %placeholder.display(),
            final_path = %final_path.display(),
            delete_attempts,
            transfer = ?transfer,
            "placeholder swapped for content"
        );
        Ok(SwapOutcome {
            delete_attempts,
            placeholder_was_missing,
            transfer,
            final_path: final_path.to_path_buf(),
        })
    }

    async fn prepare(&self, temp: &Path, final_path: &Path) -> SwapResult<()> {
        if !self.ops.is_file(temp).await {
            return Err(SwapError::Permanent {
                operation: SwapStep::Prepare.as_str(),
                path: temp.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "staged artifact missing"),
            });
        }
        if let Some(parent) = final_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.ops
                .create_dir_all(parent)
                .await
                .map_err(|err| pre_delete_error(SwapStep::Prepare, parent, err))?;
        }
        Ok(())
    }

    async fn remove_placeholder(&self, placeholder: &Path) -> SwapResult<(u32, bool)> {
        let mut attempt = 1;
        loop {
            match self.ops.remove_file(placeholder).await {
                Ok(()) => return Ok((attempt, false)),
                Err(err) => match classify_io(&err) {
                    IoClass::Missing => {
                        debug!(path = %placeholder.display(), "placeholder already absent");
                        return Ok((attempt, true));
                    }
                    IoClass::Contention if self.policy.should_retry(attempt) => {
                        let delay = self.policy.delay_for(attempt);
                        warn!(
                            error = %err,
                            path = %placeholder.display(),
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "placeholder locked; retrying delete"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    IoClass::Contention => {
                        return Err(SwapError::LockContention {
                            path: placeholder.to_path_buf(),
                            attempts: attempt,
                            source: err,
                        });
                    }
                    _ => return Err(pre_delete_error(SwapStep::RemovePlaceholder, placeholder, err)),
                },
            }
        }
    }

    async fn install(&self, temp: &Path, final_path: &Path) -> SwapResult<TransferMode> {
        let rename_err = match self.ops.rename(temp, final_path).await {
            Ok(()) => return Ok(TransferMode::Renamed),
            Err(err) => err,
        };
        if classify_io(&rename_err) != IoClass::CrossDevice {
            return Err(partial(temp, final_path, rename_err));
        }

        debug!(
            from = %temp.display(),
            to = %final_path.display(),
            "rename crosses devices; copying"
        );
        if let Err(copy_err) = self.ops.copy(temp, final_path).await {
            if let Err(cleanup_err) = self.ops.remove_file(final_path).await
                && classify_io(&cleanup_err) != IoClass::Missing
            {
                warn!(
                    error = %cleanup_err,
                    path = %final_path.display(),
                    "failed to remove partial copy"
                );
            }
            return Err(partial(temp, final_path, copy_err));
        }
        if let Err(err) = self.ops.remove_file(temp).await {
            warn!(error = %err, path = %temp.display(), "copied artifact but could not remove staged file");
        }
        Ok(TransferMode::Copied)
    }
}

fn pre_delete_error(step: SwapStep, path: &Path, err: io::Error) -> SwapError {
    if classify_io(&err) == IoClass::Full {
        SwapError::FilesystemFull {
            path: path.to_path_buf(),
            source: err,
        }
    } else {
        SwapError::Permanent {
            operation: step.as_str(),
            path: path.to_path_buf(),
            source: err,
        }
    }
}

fn partial(temp: &Path, final_path: &Path, source: io::Error) -> SwapError {
    error!(
        error = %source,
        final_path = %final_path.display(),
        retained_temp = %temp.display(),
        "placeholder deleted but content install failed; staged artifact kept for recovery"
    );
    SwapError::PartialSwap {
        final_path: final_path.to_path_buf(),
        retained_temp: temp.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use std::io::ErrorKind;
    use std::sync::Mutex;
    use tempfile::TempDir;

    type TestResult<T> = anyhow::Result<T>;

    /// Real filesystem with scripted failures.
    #[derive(Default)]
    struct ScriptedOps {
        remove_failures: Mutex<Vec<ErrorKind>>,
        rename_failure: Option<ErrorKind>,
        copy_failure: Option<ErrorKind>,
        remove_calls: Mutex<u32>,
    }

    #[async_trait]
    impl FileOps for ScriptedOps {
        async fn remove_file(&self, path: &Path) -> io::Result<()> {
            *self.remove_calls.lock().expect("lock") += 1;
            if let Some(kind) = self.remove_failures.lock().expect("lock").pop() {
                return Err(io::Error::from(kind));
            }
            TokioFileOps.remove_file(path).await
        }

        async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            match self.rename_failure {
                Some(kind) => Err(io::Error::from(kind)),
                None => TokioFileOps.rename(from, to).await,
            }
        }

        async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
            match self.copy_failure {
                Some(kind) => {
                    fs::write(to, b"half")?;
                    Err(io::Error::from(kind))
                }
                None => TokioFileOps.copy(from, to).await,
            }
        }

        async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            TokioFileOps.create_dir_all(path).await
        }

        async fn is_file(&self, path: &Path) -> bool {
            TokioFileOps.is_file(path).await
        }
    }

    struct Layout {
        _dir: TempDir,
        placeholder: PathBuf,
        temp: PathBuf,
    }

    fn layout() -> TestResult<Layout> {
        let dir = tempfile::Builder::new().prefix("lectern-fsops-").tempdir()?;
        let library = dir.path().join("library");
        let staging = dir.path().join("staging");
        fs::create_dir_all(&library)?;
        fs::create_dir_all(&staging)?;
        let placeholder = library.join("a.epub");
        let temp = staging.join("x.part");
        fs::write(&placeholder, b"{\"lectern_placeholder\":true}")?;
        fs::write(&temp, b"real content")?;
        Ok(Layout {
            _dir: dir,
            placeholder,
            temp,
        })
    }

    #[tokio::test]
    async fn swap_installs_content_in_place() -> TestResult<()> {
        let layout = layout()?;
        let replacer = FileReplacer::new(RetryPolicy::immediate(4));
        let outcome = replacer
            .swap(&layout.placeholder, &layout.temp, &layout.placeholder)
            .await?;
        assert_eq!(outcome.transfer, TransferMode::Renamed);
        assert_eq!(outcome.delete_attempts, 1);
        assert_eq!(fs::read(&layout.placeholder)?, b"real content");
        assert!(!layout.temp.exists());
        Ok(())
    }

    #[tokio::test]
    async fn lock_contention_is_retried_within_bound() -> TestResult<()> {
        let layout = layout()?;
        let ops = Arc::new(ScriptedOps {
            remove_failures: Mutex::new(vec![ErrorKind::ResourceBusy; 3]),
            ..ScriptedOps::default()
        });
        let replacer = FileReplacer::with_ops(ops.clone(), RetryPolicy::immediate(4));
        let outcome = replacer
            .swap(&layout.placeholder, &layout.temp, &layout.placeholder)
            .await?;
        assert_eq!(outcome.delete_attempts, 4);
        assert_eq!(fs::read(&layout.placeholder)?, b"real content");
        Ok(())
    }

    #[tokio::test]
    async fn persistent_lock_leaves_everything_untouched() -> TestResult<()> {
        let layout = layout()?;
        let ops = Arc::new(ScriptedOps {
            remove_failures: Mutex::new(vec![ErrorKind::ResourceBusy; 10]),
            ..ScriptedOps::default()
        });
        let replacer = FileReplacer::with_ops(ops.clone(), RetryPolicy::immediate(4));
        let err = replacer
            .swap(&layout.placeholder, &layout.temp, &layout.placeholder)
            .await
            .err();
        assert!(matches!(
            err,
            Some(SwapError::LockContention { attempts: 4, .. })
        ));
        assert_eq!(*ops.remove_calls.lock().expect("lock"), 4);
        assert!(layout.placeholder.exists());
        assert!(layout.temp.exists());
        Ok(())
    }

    #[tokio::test]
    async fn failed_install_is_partial_and_keeps_temp() -> TestResult<()> {
        let layout = layout()?;
        let ops = Arc::new(ScriptedOps {
            rename_failure: Some(ErrorKind::PermissionDenied),
            ..ScriptedOps::default()
        });
        let replacer = FileReplacer::with_ops(ops, RetryPolicy::immediate(4));
        let err = replacer
            .swap(&layout.placeholder, &layout.temp, &layout.placeholder)
            .await
            .err();
        match err {
            Some(SwapError::PartialSwap { retained_temp, .. }) => {
                assert_eq!(retained_temp, layout.temp);
            }
            other => anyhow::bail!("expected partial swap, got {other:?}"),
        }
        assert!(!layout.placeholder.exists());
        assert_eq!(fs::read(&layout.temp)?, b"real content");
        Ok(())
    }

    #[tokio::test]
    async fn cross_device_rename_falls_back_to_copy() -> TestResult<()> {
        let layout = layout()?;
        let ops = Arc::new(ScriptedOps {
            rename_failure: Some(ErrorKind::CrossesDevices),
            ..ScriptedOps::default()
        });
        let replacer = FileReplacer::with_ops(ops, RetryPolicy::immediate(1));
        let outcome = replacer
            .swap(&layout.placeholder, &layout.temp, &layout.placeholder)
            .await?;
        assert_eq!(outcome.transfer, TransferMode::Copied);
        assert_eq!(fs::read(&layout.placeholder)?, b"real content");
        assert!(!layout.temp.exists());
        Ok(())
    }

    #[tokio::test]
    async fn failed_copy_removes_partial_destination() -> TestResult<()> {
        let layout = layout()?;
        let ops = Arc::new(ScriptedOps {
            rename_failure: Some(ErrorKind::CrossesDevices),
            copy_failure: Some(ErrorKind::StorageFull),
            ..ScriptedOps::default()
        });
        let replacer = FileReplacer::with_ops(ops, RetryPolicy::immediate(1));
        let err = replacer
            .swap(&layout.placeholder, &layout.temp, &layout.placeholder)
            .await
            .err();
        assert!(err.as_ref().is_some_and(SwapError::is_partial));
        assert!(!layout.placeholder.exists());
        assert!(layout.temp.exists());
        Ok(())
    }

    #[tokio::test]
    async fn missing_placeholder_counts_as_deleted() -> TestResult<()> {
        let layout = layout()?;
        fs::remove_file(&layout.placeholder)?;
        let replacer = FileReplacer::new(RetryPolicy::immediate(1));
        let outcome = replacer
            .swap(&layout.placeholder, &layout.temp, &layout.placeholder)
            .await?;
        assert!(outcome.placeholder_was_missing);
        assert_eq!(fs::read(&layout.placeholder)?, b"real content");
        Ok(())
    }

    #[tokio::test]
    async fn missing_artifact_fails_before_touching_placeholder() -> TestResult<()> {
        let layout = layout()?;
        fs::remove_file(&layout.temp)?;
        let replacer = FileReplacer::new(RetryPolicy::immediate(1));
        let err = replacer
            .swap(&layout.placeholder, &layout.temp, &layout.placeholder)
            .await
            .err();
        assert!(matches!(err, Some(SwapError::Permanent { operation: "prepare", .. })));
        assert!(layout.placeholder.exists());
        Ok(())
    }
}
