//! Scripted collaborators for orchestrator and health tests.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use lectern_core::{
    CacheError, CacheResult, CacheTarget, ContentFetcher, FetchError, FetchResult,
    FetchedArtifact, NavigationError, NavigationResult, NavigationSink, RestartError,
    RestartMechanism, RestartResult, RestartTicket,
};
use lectern_fsops::{FileOps, TokioFileOps};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One scripted fetch result.
#[derive(Debug, Clone)]
pub enum FakeFetch {
    /// Stage these bytes.
    Content(Vec<u8>),
    /// Fail transiently.
    Transient(&'static str),
    /// Fail permanently.
    Permanent(&'static str),
}

/// Fetcher that replays scripted results, then stages `b"fetched content"`.
#[derive(Debug)]
pub struct FakeFetcher {
    staging: PathBuf,
    script: Mutex<VecDeque<FakeFetch>>,
    calls: AtomicUsize,
    preflight_error: Option<&'static str>,
}

/// Bytes staged once the script is exhausted.
pub const DEFAULT_CONTENT: &[u8] = b"fetched content";

impl FakeFetcher {
    /// Fetcher staging into `staging`.
    #[must_use]
    pub fn new(staging: impl Into<PathBuf>) -> Self {
        Self {
            staging: staging.into(),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            preflight_error: None,
        }
    }

    /// Queue results returned in order by subsequent fetches.
    #[must_use]
    pub fn with_script(self, script: impl IntoIterator<Item = FakeFetch>) -> Self {
        lock(&self.script).extend(script);
        self
    }

    /// Make preflight fail with `detail`.
    #[must_use]
    pub fn with_preflight_error(mut self, detail: &'static str) -> Self {
        self.preflight_error = Some(detail);
        self
    }

    /// Number of fetches performed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn fetch(&self, identity: &str) -> FetchResult<FetchedArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = lock(&self.script).pop_front();
        let bytes = match next {
            Some(FakeFetch::Transient(detail)) => {
                return Err(FetchError::transient(identity, detail));
            }
            Some(FakeFetch::Permanent(detail)) => {
                return Err(FetchError::permanent(identity, detail));
            }
            Some(FakeFetch::Content(bytes)) => bytes,
            None => DEFAULT_CONTENT.to_vec(),
        };
        let temp_path = self.staging.join(format!("{}.part", Uuid::new_v4()));
        tokio::fs::write(&temp_path, &bytes)
            .await
            .map_err(|err| FetchError::permanent(identity, err.to_string()))?;
        Ok(FetchedArtifact {
            temp_path,
            suggested_name: None,
            bytes: bytes.len() as u64,
        })
    }

    async fn preflight(&self) -> FetchResult<()> {
        match self.preflight_error {
            Some(detail) => Err(FetchError::permanent("preflight", detail)),
            None => Ok(()),
        }
    }
}

/// Scripted behaviour of a [`RecordingCacheTarget`].
#[derive(Debug, Clone, Copy)]
pub enum CacheBehaviour {
    /// Report this many invalidated entries.
    Invalidate(usize),
    /// Return an error.
    Fail,
    /// Panic inside `invalidate`.
    Panic,
}

/// Cache target that records every invalidation request.
#[derive(Debug)]
pub struct RecordingCacheTarget {
    name: String,
    present: bool,
    behaviour: CacheBehaviour,
    calls: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl RecordingCacheTarget {
    /// Present target with the given behaviour.
    #[must_use]
    pub fn new(name: impl Into<String>, behaviour: CacheBehaviour) -> Self {
        Self {
            name: name.into(),
            present: true,
            behaviour,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Target whose probe reports it absent.
    #[must_use]
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            present: false,
            ..Self::new(name, CacheBehaviour::Invalidate(0))
        }
    }

    /// Recorded `(old, new)` pairs.
    #[must_use]
    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl CacheTarget for RecordingCacheTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> bool {
        self.present
    }

    async fn invalidate(&self, old_path: &Path, new_path: &Path) -> CacheResult<usize> {
        lock(&self.calls).push((old_path.to_path_buf(), new_path.to_path_buf()));
        match self.behaviour {
            CacheBehaviour::Invalidate(entries) => Ok(entries),
            CacheBehaviour::Fail => Err(CacheError::Collaborator {
                detail: format!("{} always fails", self.name),
            }),
            CacheBehaviour::Panic => panic!("{} panicked during invalidation", self.name),
        }
    }
}

/// Restart mechanism with a fixed answer.
#[derive(Debug)]
pub struct FakeRestart {
    name: &'static str,
    available: bool,
    succeed: bool,
    exit_code: i32,
    calls: AtomicUsize,
}

impl FakeRestart {
    /// Available mechanism that always accepts.
    #[must_use]
    pub fn accepting(name: &'static str, exit_code: i32) -> Self {
        Self {
            name,
            available: true,
            succeed: true,
            exit_code,
            calls: AtomicUsize::new(0),
        }
    }

    /// Mechanism that reports itself unavailable.
    #[must_use]
    pub fn unavailable(name: &'static str) -> Self {
        Self {
            available: false,
            succeed: false,
            ..Self::accepting(name, 0)
        }
    }

    /// Available mechanism whose restart attempt fails.
    #[must_use]
    pub fn failing(name: &'static str) -> Self {
        Self {
            succeed: false,
            ..Self::accepting(name, 0)
        }
    }

    /// Number of restart attempts.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RestartMechanism for FakeRestart {
    fn name(&self) -> &str {
        self.name
    }

    fn available(&self) -> bool {
        self.available
    }

    async fn restart(&self) -> RestartResult<RestartTicket> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            Ok(RestartTicket {
                mechanism: self.name.to_string(),
                exit_code: self.exit_code,
            })
        } else {
            Err(RestartError::Spawn {
                mechanism: self.name.to_string(),
                source: io::Error::other("scripted restart failure"),
            })
        }
    }
}

/// Navigation sink that checks the filesystem and records requests.
#[derive(Debug, Default)]
pub struct RecordingNavigation {
    navigated: Mutex<Vec<PathBuf>>,
    opened: Mutex<Vec<PathBuf>>,
    unavailable: bool,
    refuse_open: bool,
}

impl RecordingNavigation {
    /// Sink that reports itself unavailable to health probes.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Sink whose `open_content` always fails with an I/O error.
    #[must_use]
    pub fn refusing_open() -> Self {
        Self {
            refuse_open: true,
            ..Self::default()
        }
    }

    /// Folders navigated to.
    #[must_use]
    pub fn navigated(&self) -> Vec<PathBuf> {
        lock(&self.navigated).clone()
    }

    /// Content opened directly.
    #[must_use]
    pub fn opened(&self) -> Vec<PathBuf> {
        lock(&self.opened).clone()
    }
}

#[async_trait]
impl NavigationSink for RecordingNavigation {
    async fn navigate(&self, folder: &Path) -> NavigationResult<()> {
        if !folder.is_dir() {
            return Err(NavigationError::TargetMissing {
                path: folder.to_path_buf(),
            });
        }
        lock(&self.navigated).push(folder.to_path_buf());
        Ok(())
    }

    async fn open_content(&self, path: &Path) -> NavigationResult<()> {
        if self.refuse_open {
            return Err(NavigationError::Io {
                operation: "navigation.open",
                path: path.to_path_buf(),
                source: io::Error::other("scripted open failure"),
            });
        }
        if !path.is_file() {
            return Err(NavigationError::TargetMissing {
                path: path.to_path_buf(),
            });
        }
        lock(&self.opened).push(path.to_path_buf());
        Ok(())
    }

    async fn target_available(&self) -> bool {
        !self.unavailable
    }
}

/// Real filesystem whose renames always fail, simulating a broken install step.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingRenameOps;

#[async_trait]
impl FileOps for FailingRenameOps {
    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        TokioFileOps.remove_file(path).await
    }

    async fn rename(&self, _from: &Path, _to: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "scripted rename failure",
        ))
    }

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        TokioFileOps.copy(from, to).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        TokioFileOps.create_dir_all(path).await
    }

    async fn is_file(&self, path: &Path) -> bool {
        TokioFileOps.is_file(path).await
    }
}
