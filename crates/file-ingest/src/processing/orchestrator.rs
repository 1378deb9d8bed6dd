//! Upload acceptance and background dispatch

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::worker::{panic_message, ProcessingWorker};
use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::ingestion::{FileParser, FormatDetector};
use crate::progress::ProgressStore;
use crate::storage::{BlobStore, FileRecordDb};
use crate::types::FileRecord;

/// MIME type recorded when none is declared or guessable
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// An accepted file and the background unit processing it.
/// Dropping `task` detaches the unit; it keeps running.
pub struct Submission {
    pub record: FileRecord,
    pub task: JoinHandle<()>,
}

/// Accepts uploads, persists their records and dispatches one background
/// unit per file, bounded by a semaphore.
pub struct IngestOrchestrator {
    db: FileRecordDb,
    blobs: Arc<dyn BlobStore>,
    worker: ProcessingWorker,
    semaphore: Arc<Semaphore>,
    max_upload_size: u64,
}

impl IngestOrchestrator {
    pub fn new(
        config: &IngestConfig,
        db: FileRecordDb,
        blobs: Arc<dyn BlobStore>,
        channel: Arc<dyn ProgressStore>,
    ) -> Self {
        let parallel_files = config.processing.worker_limit();
        tracing::info!(
            "Orchestrator configured: {} parallel files, {} byte upload limit",
            parallel_files,
            config.server.max_upload_size
        );

        let worker = ProcessingWorker::new(
            db.clone(),
            channel,
            blobs.clone(),
            FormatDetector::new(config.formats.clone()),
            FileParser::default(),
        );

        Self {
            db,
            blobs,
            worker,
            semaphore: Arc::new(Semaphore::new(parallel_files)),
            max_upload_size: config.server.max_upload_size,
        }
    }

    /// Use a different parser registry for new units
    pub fn with_parsers(mut self, parsers: FileParser) -> Self {
        self.worker = self.worker.with_parsers(parsers);
        self
    }

    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    /// Reject sizes above the configured maximum
    pub fn check_size(&self, file_size: u64) -> Result<()> {
        if file_size > self.max_upload_size {
            return Err(Error::FileTooLarge {
                size: file_size,
                max: self.max_upload_size,
            });
        }
        Ok(())
    }

    /// Store uploaded bytes and submit them for processing.
    ///
    /// Oversized uploads are rejected before anything is written. Without a
    /// declared MIME type one is guessed from the filename.
    pub async fn accept_upload(
        &self,
        owner_id: &str,
        declared_name: &str,
        declared_mime: Option<&str>,
        data: &[u8],
    ) -> Result<Submission> {
        let file_size = data.len() as u64;
        self.check_size(file_size)?;

        let mime_type = match declared_mime.map(str::trim).filter(|m| !m.is_empty()) {
            Some(mime) => mime.to_string(),
            None => mime_guess::from_path(declared_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };

        let id = Uuid::new_v4();
        let stored_path = self.blobs.store(id, declared_name, data).await?;

        match self.submit_with_id(id, owner_id, file_size, declared_name, &mime_type, &stored_path) {
            Ok(submission) => Ok(submission),
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&stored_path).await {
                    tracing::warn!("Failed to remove orphaned upload {}: {}", stored_path, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Create the record for already-stored bytes and dispatch its unit
    pub fn submit(
        &self,
        owner_id: &str,
        file_size: u64,
        declared_name: &str,
        declared_mime: &str,
        stored_path: &str,
    ) -> Result<Submission> {
        self.submit_with_id(
            Uuid::new_v4(),
            owner_id,
            file_size,
            declared_name,
            declared_mime,
            stored_path,
        )
    }

    fn submit_with_id(
        &self,
        id: Uuid,
        owner_id: &str,
        file_size: u64,
        declared_name: &str,
        declared_mime: &str,
        stored_path: &str,
    ) -> Result<Submission> {
        self.check_size(file_size)?;

        let mime_type = if declared_mime.trim().is_empty() {
            DEFAULT_MIME_TYPE
        } else {
            declared_mime
        };
        let record = FileRecord::new(id, owner_id, declared_name, stored_path, file_size, mime_type);
        self.db.insert(&record)?;

        tracing::info!(
            "Accepted file {} ({}, {} bytes) for owner {}",
            id,
            declared_name,
            file_size,
            owner_id
        );

        let task = self.dispatch(id);
        Ok(Submission { record, task })
    }

    /// Spawn the background unit for a record
    fn dispatch(&self, id: Uuid) -> JoinHandle<()> {
        let worker = self.worker.clone();
        let semaphore = self.semaphore.clone();

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!("Cannot schedule file {}: {}", id, e);
                    worker.fail_unexpected(id, "Processing could not be scheduled");
                    return;
                }
            };

            let unit = {
                let worker = worker.clone();
                tokio::spawn(async move { worker.process(id).await })
            };

            if let Err(e) = unit.await {
                let message = format!("Processing panicked: {}", panic_message(e));
                tracing::error!("File {}: {}", id, message);
                worker.fail_unexpected(id, &message);
            }
        })
    }
}
