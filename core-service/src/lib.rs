//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided capabilities (the remote catalog, an
//! optional raw converter, a clock) and a [`SyncConfig`] into a ready
//! [`SyncService`]: catalog pool opened and migrated, run history attached,
//! event bus created.
//!
//! ```rust,ignore
//! use core_service::{SyncDependencies, SyncService};
//!
//! let service = SyncService::bootstrap(config, SyncDependencies::new(remote)).await?;
//! let mut events = service.subscribe();
//! let summary = service.run_once().await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use core_runtime::config::SyncConfig;
pub use core_runtime::events::{CoreEvent, SyncEvent};
pub use core_sync::{AuditReport, RunOutcome, RunRecord, RunStats, RunSummary};

use std::sync::Arc;

use bridge_traits::{Clock, RawConverter, RemoteCatalog, SystemClock};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{CatalogRepository, SqliteCatalogStore};
use core_runtime::events::EventBus;
use core_runtime::retry::RetryPolicy;
use core_sync::{
    EventBusProgress, RunCoordinator, RunHistoryRepository, SqliteRunHistoryRepository,
};
use tokio::sync::broadcast::Receiver;
use tracing::info;

const EVENT_CAPACITY: usize = 256;

/// Host capabilities the core requires.
pub struct SyncDependencies {
    pub remote: Arc<dyn RemoteCatalog>,
    pub converter: Option<Arc<dyn RawConverter>>,
    pub clock: Arc<dyn Clock>,
}

impl SyncDependencies {
    /// Dependencies with the system clock and the configured raw converter.
    pub fn new(remote: Arc<dyn RemoteCatalog>) -> Self {
        Self {
            remote,
            converter: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn RawConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct SyncService {
    coordinator: Arc<RunCoordinator>,
    catalog: Arc<dyn CatalogRepository>,
    history: Arc<dyn RunHistoryRepository>,
    events: EventBus,
}

impl SyncService {
    /// Open the catalog and assemble the run coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] for an invalid configuration and
    /// [`CoreError::Catalog`] if the catalog database cannot be opened.
    pub async fn bootstrap(config: SyncConfig, deps: SyncDependencies) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config
            .catalog_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoreError::InitializationFailed(format!(
                    "Cannot create catalog directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let pool = create_pool(DatabaseConfig::new(&config.catalog_path)).await?;
        let catalog: Arc<dyn CatalogRepository> = Arc::new(SqliteCatalogStore::with_retry(
            pool.clone(),
            RetryPolicy::from(&config.catalog_retry),
        ));
        let history: Arc<dyn RunHistoryRepository> =
            Arc::new(SqliteRunHistoryRepository::new(pool));
        let events = EventBus::new(EVENT_CAPACITY);

        info!(
            root = %config.root_dir.display(),
            catalog = %config.catalog_path.display(),
            workers = config.worker_count,
            "Sync service ready"
        );

        let mut coordinator = RunCoordinator::new(
            config,
            deps.remote,
            Arc::clone(&catalog),
            Arc::clone(&history),
            deps.clock,
        )?
        .with_progress(Arc::new(EventBusProgress::new(events.clone())));
        if let Some(converter) = deps.converter {
            coordinator = coordinator.with_converter(converter);
        }

        Ok(Self {
            coordinator: Arc::new(coordinator),
            catalog,
            history,
            events,
        })
    }

    /// Execute one synchronization run.
    pub async fn run_once(&self) -> Result<RunSummary> {
        Ok(self.coordinator.run().await?)
    }

    /// Compare catalog and remote without changing either.
    pub async fn audit(&self) -> Result<AuditReport> {
        Ok(self.coordinator.audit().await?)
    }

    /// Stop dispatching in the active run.
    pub fn cancel(&self) -> bool {
        self.coordinator.cancel()
    }

    pub fn is_running(&self) -> bool {
        self.coordinator.is_running()
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        Ok(self.history.recent(limit).await?)
    }

    pub fn catalog(&self) -> Arc<dyn CatalogRepository> {
        Arc::clone(&self.catalog)
    }

    pub fn config(&self) -> &SyncConfig {
        self.coordinator.config()
    }
}
