//! Runs every registered cache target for an old/new path pair.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lectern_core::CacheTarget;
use tracing::{debug, info, warn};

use crate::report::{InvalidationFailure, InvalidationReport, TargetOutcome, TargetReport};

enum Attempt {
    Absent,
    Done(lectern_core::CacheResult<usize>),
}

/// Holds the fixed list of cache targets discovered at startup.
#[derive(Clone, Default)]
pub struct CacheInvalidationCoordinator {
    targets: Vec<Arc<dyn CacheTarget>>,
}

impl std::fmt::Debug for CacheInvalidationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInvalidationCoordinator")
            .field("targets", &self.target_names())
            .finish()
    }
}

impl CacheInvalidationCoordinator {
    /// Coordinator over an explicit, ordered target list.
    #[must_use]
    pub fn new(targets: Vec<Arc<dyn CacheTarget>>) -> Self {
        Self { targets }
    }

    /// Append a target.
    pub fn register(&mut self, target: Arc<dyn CacheTarget>) {
        self.targets.push(target);
    }

    /// Registered target names, in invocation order.
    #[must_use]
    pub fn target_names(&self) -> Vec<String> {
        self.targets
            .iter()
            .map(|target| target.name().to_string())
            .collect()
    }

    /// Invalidate entries derived from `old_path` or `new_path` in every target.
    ///
    /// Never fails; absent targets are skipped, and errors or panics are
    /// recorded as failures for that target only.
    pub async fn invalidate_all(&self, old_path: &Path, new_path: &Path) -> InvalidationReport {
        let mut report = InvalidationReport::default();
        for target in &self.targets {
            let name = target.name().to_string();
            let outcome = run_isolated(Arc::clone(target), old_path, new_path).await;
            match &outcome {
                TargetOutcome::Invalidated { entries } => {
                    debug!(cache_target = %name, entries, "cache invalidated");
                }
                TargetOutcome::Skipped => {
                    debug!(cache_target = %name, "cache target absent; skipped");
                }
                TargetOutcome::Failed(failure) => {
                    warn!(cache_target = %name, error = %failure.message, "cache invalidation failed");
                }
            }
            report.targets.push(TargetReport {
                target: name,
                outcome,
            });
        }
        if !report.failed().is_empty() {
            info!(
                failed = ?report.failed(),
                "partial cache invalidation; affected caches rebuild on next access"
            );
        }
        report
    }
}

async fn run_isolated(
    target: Arc<dyn CacheTarget>,
    old_path: &Path,
    new_path: &Path,
) -> TargetOutcome {
    let name = target.name().to_string();
    let old_path: PathBuf = old_path.to_path_buf();
    let new_path: PathBuf = new_path.to_path_buf();
    let handle = tokio::spawn(async move {
        if !target.probe().await {
            return Attempt::Absent;
        }
        Attempt::Done(target.invalidate(&old_path, &new_path).await)
    });
    match handle.await {
        Ok(Attempt::Absent) => TargetOutcome::Skipped,
        Ok(Attempt::Done(Ok(entries))) => TargetOutcome::Invalidated { entries },
        Ok(Attempt::Done(Err(err))) => TargetOutcome::Failed(InvalidationFailure {
            target: name,
            message: error_chain(&err),
        }),
        Err(join_err) => TargetOutcome::Failed(InvalidationFailure {
            target: name,
            message: if join_err.is_panic() {
                "cache target panicked".to_string()
            } else {
                "cache target task cancelled".to_string()
            },
        }),
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lectern_core::{CacheError, CacheResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        present: bool,
        behaviour: fn() -> CacheResult<usize>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, present: bool, behaviour: fn() -> CacheResult<usize>) -> Arc<Self> {
            Arc::new(Self {
                name,
                present,
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    fn erased(target: &Arc<Fixed>) -> Arc<dyn CacheTarget> {
        target.clone()
    }

    #[async_trait]
    impl CacheTarget for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn probe(&self) -> bool {
            self.present
        }

        async fn invalidate(&self, _old: &Path, _new: &Path) -> CacheResult<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.behaviour)()
        }
    }

    #[tokio::test]
    async fn failures_and_panics_do_not_stop_later_targets() {
        let failing = Fixed::new("metadata", true, || {
            Err(CacheError::Collaborator {
                detail: "boom".into(),
            })
        });
        let panicking = Fixed::new("covers", true, || panic!("cover cache exploded"));
        let absent = Fixed::new("badges", false, || Ok(1));
        let healthy = Fixed::new("listing", true, || Ok(3));
        let coordinator = CacheInvalidationCoordinator::new(vec![
            erased(&failing),
            erased(&panicking),
            erased(&absent),
            erased(&healthy),
        ]);

        let report = coordinator
            .invalidate_all(Path::new("/lib/a.epub"), Path::new("/lib/a.epub"))
            .await;

        assert_eq!(report.failed(), vec!["metadata", "covers"]);
        assert_eq!(report.skipped(), vec!["badges"]);
        assert_eq!(report.invalidated(), vec!["listing"]);
        assert_eq!(
            report.outcome_for("listing"),
            Some(&TargetOutcome::Invalidated { entries: 3 })
        );
        assert_eq!(absent.calls.load(Ordering::SeqCst), 0);
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
        assert!(report.failures()[0].message.contains("boom"));
    }

    #[tokio::test]
    async fn empty_coordinator_reports_nothing() {
        let report = CacheInvalidationCoordinator::default()
            .invalidate_all(Path::new("/a"), Path::new("/a"))
            .await;
        assert!(report.targets.is_empty());
    }
}
