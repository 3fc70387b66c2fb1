use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use lectern_app::{HealthCheck, HealthStatus};
use lectern_config::FetchSettings;
use lectern_core::{ContentFetcher, NavigationSink, RestartMechanism};
use lectern_events::{Event, EventBus};
use lectern_fetch::HttpFetcher;
use lectern_registry::PlaceholderRegistry;
use lectern_runtime::RestartHandoff;
use lectern_test_support::fixtures::LibraryFixture;
use lectern_test_support::mocks::{FakeFetcher, FakeRestart, RecordingNavigation};

fn health_check(
    fixture: &LibraryFixture,
    fetcher: impl ContentFetcher + 'static,
    restart: FakeRestart,
    navigation: RecordingNavigation,
    events: &EventBus,
) -> HealthCheck {
    let config = fixture.config();
    HealthCheck::new(
        Arc::new(PlaceholderRegistry::open(config.registry_path())),
        Arc::new(fetcher) as Arc<dyn ContentFetcher>,
        RestartHandoff::new(
            config.handoff_path(),
            vec![Arc::new(restart) as Arc<dyn RestartMechanism>],
        ),
        Arc::new(navigation) as Arc<dyn NavigationSink>,
        config.library_root.clone(),
        events.clone(),
    )
}

#[tokio::test]
async fn all_probes_pass_with_healthy_collaborators() -> Result<()> {
    let fixture = LibraryFixture::new()?;
    let events = EventBus::new();
    let check = health_check(
        &fixture,
        FakeFetcher::new(fixture.staging()),
        FakeRestart::accepting("supervisor", 75),
        RecordingNavigation::default(),
        &events,
    );

    let report = check.run().await;

    assert!(report.is_healthy(), "unexpected failures: {:?}", report.checks);
    let names: Vec<_> = report.checks.iter().map(|check| check.name).collect();
    assert_eq!(
        names,
        ["registry", "fetch", "handoff_path", "restart", "navigation_target"]
    );
    let published = events.backlog(0);
    assert!(matches!(
        published.last().map(|envelope| &envelope.event),
        Some(Event::HealthChanged { degraded }) if degraded.is_empty()
    ));
    Ok(())
}

#[tokio::test]
async fn failing_probes_are_reported_by_name() -> Result<()> {
    let fixture = LibraryFixture::new()?;
    let events = EventBus::new();
    let check = health_check(
        &fixture,
        FakeFetcher::new(fixture.staging()).with_preflight_error("no network"),
        FakeRestart::unavailable("supervisor"),
        RecordingNavigation::unavailable(),
        &events,
    );

    let report = check.run().await;

    assert!(!report.is_healthy());
    assert_eq!(report.failing(), ["fetch", "restart", "navigation_target"]);
    let fetch = report
        .checks
        .iter()
        .find(|check| check.name == "fetch")
        .map(|check| (check.status, check.detail.clone()));
    assert_eq!(fetch, Some((HealthStatus::Fail, "no network".to_string())));
    Ok(())
}

#[tokio::test]
async fn corrupt_registry_fails_the_registry_probe() -> Result<()> {
    let fixture = LibraryFixture::new()?;
    let store = fixture.config().registry_path();
    if let Some(parent) = store.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&store, b"{ not json")?;
    let events = EventBus::new();
    let check = health_check(
        &fixture,
        FakeFetcher::new(fixture.staging()),
        FakeRestart::accepting("supervisor", 75),
        RecordingNavigation::default(),
        &events,
    );

    let report = check.run().await;

    assert_eq!(report.failing(), ["registry"]);
    assert!(std::fs::read(&store)? == b"{ not json", "probe must not rewrite the store");
    Ok(())
}

#[tokio::test]
async fn report_serializes_for_json_output() -> Result<()> {
    let fixture = LibraryFixture::new()?;
    let events = EventBus::new();
    let check = health_check(
        &fixture,
        FakeFetcher::new(fixture.staging()),
        FakeRestart::accepting("supervisor", 75),
        RecordingNavigation::default(),
        &events,
    );

    let value = serde_json::to_value(check.run().await)?;

    assert_eq!(value["checks"][0]["name"], "registry");
    assert_eq!(value["checks"][0]["status"], "pass");
    assert!(value["generated_at"].is_string());
    Ok(())
}

#[tokio::test]
async fn health_run_does_not_create_the_staging_directory() -> Result<()> {
    let fixture = LibraryFixture::new()?;
    let staging = fixture.root().join("fresh-staging");
    let settings = FetchSettings {
        url_template: Some("http://127.0.0.1:9/download/{identity}".into()),
        username: None,
        password: None,
        timeout: Duration::from_secs(1),
        retries: 0,
    };
    let fetcher = HttpFetcher::from_settings(&settings, &staging)?;
    let events = EventBus::new();
    let check = health_check(
        &fixture,
        fetcher,
        FakeRestart::accepting("supervisor", 75),
        RecordingNavigation::default(),
        &events,
    );

    let report = check.run().await;

    assert!(report.is_healthy(), "unexpected failures: {:?}", report.checks);
    assert!(!staging.exists(), "health run created {}", staging.display());
    assert!(!fixture.config().handoff_path().exists());
    Ok(())
}
