//! Service wiring from a loaded [`LecternConfig`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lectern_cache::{CacheInvalidationCoordinator, build_target};
use lectern_config::LecternConfig;
use lectern_core::{
    ContentFetcher, FetchError, FetchResult, FetchedArtifact, NavigationSink, RetryPolicy,
};
use lectern_events::EventBus;
use lectern_fetch::{FetcherSetupError, HttpFetcher};
use lectern_fsops::FileReplacer;
use lectern_registry::PlaceholderRegistry;
use lectern_runtime::{RestartHandoff, mechanisms_from_settings};
use lectern_telemetry::{LogFormat, LoggingConfig, Metrics};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::health::HealthCheck;
use crate::orchestrator::{OrchestratorDeps, WorkflowOrchestrator};

const FETCH_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Fully wired application services.
pub struct AppContext {
    config: LecternConfig,
    events: EventBus,
    metrics: Metrics,
    registry: Arc<PlaceholderRegistry>,
    orchestrator: WorkflowOrchestrator,
    health: HealthCheck,
}

impl AppContext {
    /// Build every collaborator from `config`.
    ///
    /// A missing download URL is not fatal: the fetcher reports permanent
    /// failures and the health check flags it.
    ///
    /// # Errors
    ///
    /// Fails when metrics cannot be registered, the HTTP client cannot be
    /// built, or the staging directory cannot be created.
    pub fn from_config(
        config: LecternConfig,
        navigation: Arc<dyn NavigationSink>,
    ) -> AppResult<Self> {
        let events = EventBus::new();
        let metrics =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;

        std::fs::create_dir_all(&config.temp_dir).map_err(|source| AppError::Io {
            operation: "bootstrap.create_temp_dir",
            path: Some(config.temp_dir.clone()),
            source,
        })?;

        let registry = Arc::new(PlaceholderRegistry::open(config.registry_path()));

        let fetcher = build_fetcher(&config)?;
        let replacer = FileReplacer::new(RetryPolicy::with_retries(
            config.swap.retries,
            config.swap.backoff,
        ));
        let caches = CacheInvalidationCoordinator::new(
            config.cache_targets.iter().map(build_target).collect(),
        );
        let handoff = RestartHandoff::new(
            config.handoff_path(),
            mechanisms_from_settings(&config.restart),
        );
        info!(
            library = %config.library_root.display(),
            cache_targets = ?caches.target_names(),
            restart_mechanisms = ?handoff.mechanism_names(),
            "services wired"
        );

        let health = HealthCheck::new(
            Arc::clone(&registry),
            Arc::clone(&fetcher),
            handoff.clone(),
            Arc::clone(&navigation),
            config.library_root.clone(),
            events.clone(),
        );
        let orchestrator = WorkflowOrchestrator::new(OrchestratorDeps {
            registry: Arc::clone(&registry),
            fetcher,
            fetch_policy: RetryPolicy::with_retries(config.fetch.retries, FETCH_RETRY_BACKOFF),
            replacer,
            caches,
            handoff,
            navigation,
            events: events.clone(),
            metrics: metrics.clone(),
        });

        Ok(Self {
            config,
            events,
            metrics,
            registry,
            orchestrator,
            health,
        })
    }

    /// Loaded configuration.
    #[must_use]
    pub const fn config(&self) -> &LecternConfig {
        &self.config
    }

    /// Event bus shared by every service.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Metrics registry.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Placeholder registry.
    #[must_use]
    pub fn registry(&self) -> &PlaceholderRegistry {
        &self.registry
    }

    /// Workflow orchestrator.
    #[must_use]
    pub const fn orchestrator(&self) -> &WorkflowOrchestrator {
        &self.orchestrator
    }

    /// Health check.
    #[must_use]
    pub const fn health(&self) -> &HealthCheck {
        &self.health
    }
}

/// Logging settings derived from configuration.
#[must_use]
pub fn logging_config(config: &LecternConfig) -> LoggingConfig<'_> {
    LoggingConfig {
        filter: &config.logging.level,
        format: LogFormat::resolve(config.logging.format.as_deref()),
    }
}

fn build_fetcher(config: &LecternConfig) -> AppResult<Arc<dyn ContentFetcher>> {
    match HttpFetcher::from_settings(&config.fetch, config.temp_dir.clone()) {
        Ok(fetcher) => Ok(Arc::new(fetcher)),
        Err(FetcherSetupError::NotConfigured) => {
            warn!("no download url configured; placeholders cannot be fetched");
            Ok(Arc::new(UnconfiguredFetcher))
        }
        Err(err) => Err(AppError::fetcher("fetch.http_client", err)),
    }
}

/// Stand-in fetcher used when no download endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredFetcher;

const NOT_CONFIGURED: &str = "download url not configured";

#[async_trait]
impl ContentFetcher for UnconfiguredFetcher {
    async fn fetch(&self, identity: &str) -> FetchResult<FetchedArtifact> {
        Err(FetchError::permanent(identity, NOT_CONFIGURED))
    }

    async fn preflight(&self) -> FetchResult<()> {
        Err(FetchError::permanent("", NOT_CONFIGURED))
    }
}
