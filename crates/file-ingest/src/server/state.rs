//! Application state for the ingestion server

use std::sync::Arc;

use crate::config::IngestConfig;
use crate::error::Result;
use crate::processing::{IngestOrchestrator, StatusService};
use crate::progress::MemoryProgressStore;
use crate::storage::{BlobStore, FileRecordDb, LocalBlobStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: IngestConfig,
    /// Progress channel
    progress: Arc<MemoryProgressStore>,
    /// Upload acceptance and dispatch
    orchestrator: IngestOrchestrator,
    /// Status and detail queries
    status: StatusService,
}

impl AppState {
    /// Open the configured stores and build the pipeline
    pub fn new(config: IngestConfig) -> Result<Self> {
        tracing::info!(
            "Opening file records at {}",
            config.storage.database_path.display()
        );
        let db = FileRecordDb::new(&config.storage.database_path)?;

        tracing::info!("Storing uploads in {}", config.storage.upload_dir.display());
        let blobs = Arc::new(LocalBlobStore::new(config.storage.upload_dir.clone())?);

        Ok(Self::from_parts(config, db, blobs))
    }

    /// Build state around existing stores
    pub fn from_parts(config: IngestConfig, db: FileRecordDb, blobs: Arc<dyn BlobStore>) -> Self {
        let progress = Arc::new(MemoryProgressStore::new(config.progress.ttl_secs));
        let orchestrator =
            IngestOrchestrator::new(&config, db.clone(), blobs.clone(), progress.clone());
        let status = StatusService::new(db, progress.clone(), blobs);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                progress,
                orchestrator,
                status,
            }),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &IngestConfig {
        &self.inner.config
    }

    /// Get the orchestrator
    pub fn orchestrator(&self) -> &IngestOrchestrator {
        &self.inner.orchestrator
    }

    /// Get the status service
    pub fn status(&self) -> &StatusService {
        &self.inner.status
    }

    /// Get the progress channel
    pub fn progress(&self) -> &Arc<MemoryProgressStore> {
        &self.inner.progress
    }
}
