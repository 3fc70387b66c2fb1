use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use lectern_app::{
    FailedStage, OrchestratorDeps, ResumeOutcome, WorkflowOrchestrator, WorkflowOutcome,
};
use lectern_cache::CacheInvalidationCoordinator;
use lectern_core::{
    CacheTarget, ContentFetcher, FetchResult, FetchedArtifact, RestartMechanism, RetryPolicy,
};
use lectern_events::{Event, EventBus, NoticeSeverity};
use lectern_fsops::{FileOps, FileReplacer};
use lectern_registry::PlaceholderRegistry;
use lectern_runtime::{HandoffLoad, RestartHandoff};
use lectern_telemetry::Metrics;
use lectern_test_support::fixtures::LibraryFixture;
use lectern_test_support::mocks::{
    CacheBehaviour, DEFAULT_CONTENT, FailingRenameOps, FakeFetch, FakeFetcher, FakeRestart,
    RecordingCacheTarget, RecordingNavigation,
};
use tokio::sync::Notify;

struct Harness {
    fixture: LibraryFixture,
    registry: Arc<PlaceholderRegistry>,
    navigation: Arc<RecordingNavigation>,
    handoff: RestartHandoff,
    events: EventBus,
    metrics: Metrics,
    orchestrator: WorkflowOrchestrator,
}

#[derive(Default)]
struct Setup {
    fetcher: Option<Arc<dyn ContentFetcher>>,
    script: Vec<FakeFetch>,
    restarts: Vec<Arc<dyn RestartMechanism>>,
    caches: Vec<Arc<dyn CacheTarget>>,
    ops: Option<Arc<dyn FileOps>>,
    navigation: Option<RecordingNavigation>,
}

impl Setup {
    fn build(self, fixture: LibraryFixture) -> Result<Harness> {
        let config = fixture.config();
        let registry = Arc::new(PlaceholderRegistry::open(config.registry_path()));
        let fetcher = self.fetcher.unwrap_or_else(|| {
            Arc::new(FakeFetcher::new(config.temp_dir.clone()).with_script(self.script))
                as Arc<dyn ContentFetcher>
        });
        let replacer = match self.ops {
            Some(ops) => FileReplacer::with_ops(ops, RetryPolicy::immediate(3)),
            None => FileReplacer::new(RetryPolicy::immediate(3)),
        };
        let handoff = RestartHandoff::new(config.handoff_path(), self.restarts);
        let navigation = Arc::new(self.navigation.unwrap_or_default());
        let events = EventBus::new();
        let metrics = Metrics::new()?;
        let orchestrator = WorkflowOrchestrator::new(OrchestratorDeps {
            registry: Arc::clone(&registry),
            fetcher,
            fetch_policy: RetryPolicy::immediate(2),
            replacer,
            caches: CacheInvalidationCoordinator::new(self.caches),
            handoff: handoff.clone(),
            navigation: Arc::clone(&navigation) as Arc<dyn lectern_core::NavigationSink>,
            events: events.clone(),
            metrics: metrics.clone(),
        });
        Ok(Harness {
            fixture,
            registry,
            navigation,
            handoff,
            events,
            metrics,
            orchestrator,
        })
    }
}

impl Harness {
    fn placeholder(&self, relative: &str, identity: &str) -> Result<PathBuf> {
        let path = self.fixture.library_path(relative);
        self.registry.materialize(identity, &path)?;
        Ok(path)
    }

    fn notices(&self) -> Vec<(NoticeSeverity, String)> {
        self.events
            .backlog(0)
            .into_iter()
            .filter_map(|envelope| match envelope.event {
                Event::Notice { severity, message } => Some((severity, message)),
                _ => None,
            })
            .collect()
    }

    fn has_event(&self, kind: &str) -> bool {
        self.events
            .backlog(0)
            .iter()
            .any(|envelope| envelope.event.kind() == kind)
    }
}

fn erased(targets: Vec<Arc<RecordingCacheTarget>>) -> Vec<Arc<dyn CacheTarget>> {
    targets
        .into_iter()
        .map(|target| target as Arc<dyn CacheTarget>)
        .collect()
}

#[tokio::test]
async fn real_content_never_starts_a_run() -> Result<()> {
    let harness = Setup::default().build(LibraryFixture::new()?)?;
    let real = harness.fixture.write_file("shelf/real.epub", b"real")?;

    let outcome = harness.orchestrator.open(&real).await;

    assert_eq!(outcome, WorkflowOutcome::NotPlaceholder);
    assert!(harness.events.backlog(0).is_empty());
    assert_eq!(std::fs::read(&real)?, b"real");
    Ok(())
}

#[tokio::test]
async fn restart_unavailable_falls_back_to_in_process_open() -> Result<()> {
    let harness = Setup {
        restarts: vec![
            Arc::new(FakeRestart::unavailable("supervisor")) as Arc<dyn RestartMechanism>,
        ],
        ..Setup::default()
    }
    .build(LibraryFixture::new()?)?;
    let book = harness.placeholder("shelf/a.epub", "cat-1")?;

    let outcome = harness.orchestrator.open(&book).await;

    assert_eq!(outcome, WorkflowOutcome::OpenedInProcess { path: book.clone() });
    assert!(!harness.registry.is_placeholder(&book));
    assert_eq!(std::fs::read(&book)?, DEFAULT_CONTENT);
    assert_eq!(harness.navigation.opened(), vec![book.clone()]);
    assert!(harness.has_event("handoff_persisted"));
    assert!(harness.has_event("restart_unavailable"));
    assert!(
        !harness.handoff.path().exists(),
        "unused handoff must be cleared"
    );
    assert_eq!(harness.fixture.staged_count()?, 0);
    assert!(harness.notices().is_empty());
    assert_eq!(harness.metrics.snapshot().runs_succeeded, 1);
    Ok(())
}

#[tokio::test]
async fn failed_in_process_open_is_not_reported_as_opened() -> Result<()> {
    let harness = Setup {
        navigation: Some(RecordingNavigation::refusing_open()),
        ..Setup::default()
    }
    .build(LibraryFixture::new()?)?;
    let book = harness.placeholder("shelf/a.epub", "cat-1")?;

    let outcome = harness.orchestrator.open(&book).await;

    let WorkflowOutcome::InstalledNotOpened { path, .. } = outcome else {
        bail!("expected installed-not-opened, got {outcome:?}");
    };
    assert_eq!(path, book);
    assert_eq!(std::fs::read(&book)?, DEFAULT_CONTENT);
    assert!(harness.navigation.opened().is_empty());
    assert!(!harness.has_event("opened_in_process"));
    assert!(!harness.handoff.path().exists());
    assert_eq!(
        harness.notices(),
        vec![(NoticeSeverity::Error, format!("Could not open {}.", book.display()))]
    );
    assert_eq!(harness.metrics.snapshot().runs_succeeded, 0);
    Ok(())
}

#[tokio::test]
async fn accepted_restart_leaves_handoff_for_next_process() -> Result<()> {
    let restart = Arc::new(FakeRestart::accepting("supervisor", 75));
    let harness = Setup {
        restarts: vec![Arc::clone(&restart) as Arc<dyn RestartMechanism>],
        ..Setup::default()
    }
    .build(LibraryFixture::new()?)?;
    let book = harness.placeholder("shelf/a.epub", "cat-1")?;

    let outcome = harness.orchestrator.open(&book).await;

    let WorkflowOutcome::RestartRequested(ticket) = outcome else {
        bail!("expected restart request, got {outcome:?}");
    };
    assert_eq!(ticket.exit_code, 75);
    assert_eq!(restart.calls(), 1);
    assert!(harness.navigation.opened().is_empty());

    let HandoffLoad::Consumed(state) = harness.handoff.consume().await else {
        bail!("handoff should be pending");
    };
    assert_eq!(state.folder_path, harness.fixture.library_path("shelf"));
    assert_eq!(state.book_path, Some(book));
    Ok(())
}

#[tokio::test]
async fn permanent_fetch_failure_keeps_placeholder() -> Result<()> {
    let harness = Setup {
        script: vec![FakeFetch::Permanent("404 not found")],
        restarts: vec![
            Arc::new(FakeRestart::accepting("supervisor", 75)) as Arc<dyn RestartMechanism>,
        ],
        ..Setup::default()
    }
    .build(LibraryFixture::new()?)?;
    let book = harness.placeholder("shelf/a.epub", "cat-1")?;

    let outcome = harness.orchestrator.open(&book).await;

    assert!(matches!(
        outcome,
        WorkflowOutcome::Failed {
            stage: FailedStage::Fetch,
            ..
        }
    ));
    assert!(harness.registry.is_placeholder(&book));
    assert!(!harness.handoff.path().exists(), "no handoff on fetch failure");
    let notices = harness.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].0, NoticeSeverity::Error);
    assert!(notices[0].1.contains("a.epub"));
    assert_eq!(harness.metrics.snapshot().runs_failed, 1);
    Ok(())
}

#[tokio::test]
async fn transient_fetch_failure_is_retried() -> Result<()> {
    let harness = Setup {
        script: vec![FakeFetch::Transient("503 service unavailable")],
        ..Setup::default()
    }
    .build(LibraryFixture::new()?)?;
    let book = harness.placeholder("a.epub", "cat-1")?;

    let outcome = harness.orchestrator.open(&book).await;

    assert!(matches!(outcome, WorkflowOutcome::OpenedInProcess { .. }));
    assert!(harness.has_event("fetch_retried"));
    assert_eq!(harness.metrics.snapshot().fetch_failures, 1);
    Ok(())
}

#[tokio::test]
async fn transient_failures_beyond_the_policy_fail_the_run() -> Result<()> {
    let harness = Setup {
        script: vec![FakeFetch::Transient("timeout"), FakeFetch::Transient("timeout")],
        ..Setup::default()
    }
    .build(LibraryFixture::new()?)?;
    let book = harness.placeholder("a.epub", "cat-1")?;

    let outcome = harness.orchestrator.open(&book).await;

    assert!(matches!(
        outcome,
        WorkflowOutcome::Failed {
            stage: FailedStage::Fetch,
            ..
        }
    ));
    assert!(harness.registry.is_placeholder(&book));
    Ok(())
}

#[tokio::test]
async fn partial_swap_keeps_registry_entry_and_temp_file() -> Result<()> {
    let harness = Setup {
        ops: Some(Arc::new(FailingRenameOps)),
        ..Setup::default()
    }
    .build(LibraryFixture::new()?)?;
    let book = harness.placeholder("shelf/a.epub", "cat-1")?;

    let outcome = harness.orchestrator.open(&book).await;

    assert!(matches!(
        outcome,
        WorkflowOutcome::Failed {
            stage: FailedStage::Swap,
            ..
        }
    ));
    assert!(harness.registry.is_placeholder(&book));
    assert!(!book.exists(), "placeholder was deleted before the failed move");
    assert_eq!(harness.fixture.staged_count()?, 1, "temp file retained");
    assert!(harness.has_event("swap_incomplete"));
    let notices = harness.notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].1.contains("kept at"));
    assert!(!harness.handoff.path().exists());
    Ok(())
}

#[tokio::test]
async fn reopening_after_partial_swap_completes_install() -> Result<()> {
    let fixture = LibraryFixture::new()?;
    let book = fixture.library_path("a.epub");
    PlaceholderRegistry::open(fixture.config().registry_path()).materialize("cat-1", &book)?;

    let broken = Setup {
        ops: Some(Arc::new(FailingRenameOps)),
        ..Setup::default()
    }
    .build(fixture)?;
    let first = broken.orchestrator.open(&book).await;
    assert!(matches!(first, WorkflowOutcome::Failed { .. }));

    let retry = Setup::default().build(broken.fixture)?;
    let second = retry.orchestrator.open(&book).await;

    assert_eq!(second, WorkflowOutcome::OpenedInProcess { path: book.clone() });
    assert_eq!(std::fs::read(&book)?, DEFAULT_CONTENT);
    assert!(!retry.registry.is_placeholder(&book));
    Ok(())
}

#[tokio::test]
async fn failing_cache_targets_do_not_block_the_others() -> Result<()> {
    let failing = Arc::new(RecordingCacheTarget::new("metadata", CacheBehaviour::Fail));
    let panicking = Arc::new(RecordingCacheTarget::new("listing", CacheBehaviour::Panic));
    let covers = Arc::new(RecordingCacheTarget::new("covers", CacheBehaviour::Invalidate(2)));
    let absent = Arc::new(RecordingCacheTarget::absent("search"));
    let harness = Setup {
        caches: erased(vec![
            Arc::clone(&failing),
            Arc::clone(&panicking),
            Arc::clone(&covers),
            Arc::clone(&absent),
        ]),
        ..Setup::default()
    }
    .build(LibraryFixture::new()?)?;
    let book = harness.placeholder("shelf/a.epub", "cat-1")?;

    let outcome = harness.orchestrator.open(&book).await;

    assert!(matches!(outcome, WorkflowOutcome::OpenedInProcess { .. }));
    assert_eq!(covers.calls(), vec![(book.clone(), book.clone())]);
    assert_eq!(failing.calls().len(), 1);
    assert!(absent.calls().is_empty());
    let invalidated = harness
        .events
        .backlog(0)
        .into_iter()
        .find_map(|envelope| match envelope.event {
            Event::CacheInvalidated {
                invalidated,
                skipped,
                failed,
                ..
            } => Some((invalidated, skipped, failed)),
            _ => None,
        });
    let Some((invalidated, skipped, failed)) = invalidated else {
        bail!("cache invalidation event missing");
    };
    assert_eq!(invalidated, vec!["covers".to_string()]);
    assert_eq!(skipped, vec!["search".to_string()]);
    assert_eq!(failed, vec!["metadata".to_string(), "listing".to_string()]);
    assert!(harness.notices().is_empty(), "cache failures stay diagnostic");
    Ok(())
}

#[tokio::test]
async fn resume_navigates_to_saved_folder_once() -> Result<()> {
    let harness = Setup {
        restarts: vec![
            Arc::new(FakeRestart::accepting("command", 0)) as Arc<dyn RestartMechanism>,
        ],
        ..Setup::default()
    }
    .build(LibraryFixture::new()?)?;
    let book = harness.placeholder("shelf/a.epub", "cat-1")?;
    let outcome = harness.orchestrator.open(&book).await;
    assert!(matches!(outcome, WorkflowOutcome::RestartRequested(_)));

    let folder = harness.fixture.library_path("shelf");
    assert_eq!(
        harness.orchestrator.resume().await,
        ResumeOutcome::Resumed {
            folder: folder.clone()
        }
    );
    assert_eq!(harness.navigation.navigated(), vec![folder]);
    let notices = harness.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0], (NoticeSeverity::Info, "a.epub is ready.".to_string()));
    assert_eq!(
        harness.orchestrator.resume().await,
        ResumeOutcome::NothingPending
    );
    assert_eq!(harness.metrics.snapshot().handoffs_consumed, 1);
    Ok(())
}

#[tokio::test]
async fn stale_handoff_is_dropped_without_navigation() -> Result<()> {
    let harness = Setup::default().build(LibraryFixture::new()?)?;
    let folder = harness.fixture.library_path("shelf");
    std::fs::create_dir_all(&folder)?;
    write_handoff(harness.handoff.path(), &folder, chrono::Utc::now().timestamp() - 61)?;

    assert_eq!(
        harness.orchestrator.resume().await,
        ResumeOutcome::NothingPending
    );
    assert!(harness.navigation.navigated().is_empty());
    assert!(!harness.handoff.path().exists());
    Ok(())
}

#[tokio::test]
async fn resume_into_missing_folder_reports_notice() -> Result<()> {
    let harness = Setup::default().build(LibraryFixture::new()?)?;
    let folder = harness.fixture.library_path("deleted-shelf");
    write_handoff(harness.handoff.path(), &folder, chrono::Utc::now().timestamp())?;

    assert_eq!(
        harness.orchestrator.resume().await,
        ResumeOutcome::TargetMissing {
            folder: folder.clone()
        }
    );
    let notices = harness.notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].1.contains("does not exist"));
    Ok(())
}

#[tokio::test]
async fn duplicate_open_while_running_is_ignored() -> Result<()> {
    let fixture = LibraryFixture::new()?;
    let gate = Arc::new(Notify::new());
    let fetcher = Arc::new(GatedFetcher {
        gate: Arc::clone(&gate),
        inner: FakeFetcher::new(fixture.staging()),
    });
    let harness = Setup {
        fetcher: Some(Arc::clone(&fetcher) as Arc<dyn ContentFetcher>),
        ..Setup::default()
    }
    .build(fixture)?;
    let book = harness.placeholder("a.epub", "cat-1")?;
    let orchestrator = &harness.orchestrator;

    let (first, second) = tokio::join!(orchestrator.open(&book), async {
        while !orchestrator.is_running(&book) {
            tokio::task::yield_now().await;
        }
        let outcome = orchestrator.open(&book).await;
        gate.notify_one();
        outcome
    });

    assert_eq!(second, WorkflowOutcome::AlreadyRunning);
    assert!(matches!(first, WorkflowOutcome::OpenedInProcess { .. }));
    assert_eq!(fetcher.inner.calls(), 1);
    assert!(!orchestrator.is_running(&book));
    Ok(())
}

struct GatedFetcher {
    gate: Arc<Notify>,
    inner: FakeFetcher,
}

#[async_trait]
impl ContentFetcher for GatedFetcher {
    async fn fetch(&self, identity: &str) -> FetchResult<FetchedArtifact> {
        self.gate.notified().await;
        self.inner.fetch(identity).await
    }
}

fn write_handoff(path: &Path, folder: &Path, timestamp: i64) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::json!({
        "folderPath": folder,
        "bookPath": null,
        "timestamp": timestamp,
        "schemaVersion": 1,
    });
    std::fs::write(path, serde_json::to_vec(&body)?)?;
    Ok(())
}
