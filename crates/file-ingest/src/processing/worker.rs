//! Background unit that parses one file

use std::sync::Arc;
use tokio::task::JoinError;
use uuid::Uuid;

use crate::ingestion::{FileParser, FormatDetector, ParseContext};
use crate::progress::ProgressStore;
use crate::storage::{BlobStore, FileRecordDb};
use crate::types::{FileRecord, FileStatus, ParsedDocument};

/// Progress reported when a unit picks up its file
pub const INITIAL_PROGRESS: u8 = 10;

/// Progress reported after a parser returns, before the result is saved
pub const PARSED_PROGRESS: u8 = 90;

/// Applies progress and terminal transitions to one record.
///
/// Every change is written to the record store first and then mirrored to
/// the progress channel. If the row disappears the tracker abandons the
/// unit, drops its channel entry and stops writing.
pub struct ProgressTracker {
    record: FileRecord,
    db: FileRecordDb,
    channel: Arc<dyn ProgressStore>,
    abandoned: bool,
}

impl ProgressTracker {
    pub fn new(record: FileRecord, db: FileRecordDb, channel: Arc<dyn ProgressStore>) -> Self {
        Self {
            record,
            db,
            channel,
            abandoned: false,
        }
    }

    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    /// Whether the record vanished while this unit was running
    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    /// Move the record to processing at the initial checkpoint
    pub fn begin(&mut self) {
        self.record.begin_processing(INITIAL_PROGRESS);
        self.persist();
    }

    /// Record a parser checkpoint; stale or repeated values are ignored
    pub fn checkpoint(&mut self, progress: u8) {
        if self.abandoned {
            return;
        }
        if self.record.set_progress(progress) {
            tracing::debug!("File {} at {}%", self.record.id, self.record.progress);
            self.persist();
        }
    }

    /// Store parsed content and mark the record ready
    pub fn complete(&mut self, content: ParsedDocument) {
        self.checkpoint(PARSED_PROGRESS);
        if self.abandoned {
            return;
        }
        self.record.mark_ready(content);
        self.persist();
    }

    /// Mark the record failed, keeping its last progress value
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.abandoned {
            return;
        }
        self.record.mark_failed(message);
        self.persist();
    }

    fn persist(&mut self) {
        if self.abandoned {
            return;
        }
        let id = self.record.id;

        match self.db.update(&self.record) {
            Ok(true) => {}
            Ok(false) => {
                self.abandon();
                return;
            }
            Err(e) if self.record.is_terminal() => {
                tracing::error!("Failed to persist final state of file {}: {}", id, e);
            }
            Err(e) => {
                tracing::warn!("Failed to persist progress of file {}: {}", id, e);
            }
        }

        self.channel.set(
            id,
            self.record.status,
            self.record.progress,
            self.record.error_message.clone(),
        );

        // A delete landing between the update and the mirror has already
        // cleared the channel; take back the entry just written.
        if let Ok(false) = self.db.exists(id) {
            self.abandon();
        }
    }

    fn abandon(&mut self) {
        tracing::info!("File {} was deleted during processing; abandoning", self.record.id);
        self.abandoned = true;
        self.channel.remove(self.record.id);
    }
}

/// Runs background units against shared stores
#[derive(Clone)]
pub struct ProcessingWorker {
    db: FileRecordDb,
    channel: Arc<dyn ProgressStore>,
    blobs: Arc<dyn BlobStore>,
    detector: FormatDetector,
    parsers: Arc<FileParser>,
}

impl ProcessingWorker {
    pub fn new(
        db: FileRecordDb,
        channel: Arc<dyn ProgressStore>,
        blobs: Arc<dyn BlobStore>,
        detector: FormatDetector,
        parsers: FileParser,
    ) -> Self {
        Self {
            db,
            channel,
            blobs,
            detector,
            parsers: Arc::new(parsers),
        }
    }

    /// Use a different parser registry
    pub fn with_parsers(mut self, parsers: FileParser) -> Self {
        self.parsers = Arc::new(parsers);
        self
    }

    /// Process one file from load to terminal state.
    ///
    /// The unit does blocking file and SQLite I/O, so it runs on the
    /// blocking pool. A panic inside it fails the record.
    pub async fn process(&self, id: Uuid) {
        let worker = self.clone();
        let Err(e) = tokio::task::spawn_blocking(move || worker.run(id)).await else {
            return;
        };

        let message = format!("Processing panicked: {}", panic_message(e));
        tracing::error!("File {}: {}", id, message);

        let worker = self.clone();
        if let Err(e) =
            tokio::task::spawn_blocking(move || worker.fail_unexpected(id, &message)).await
        {
            tracing::error!("Failed to record fault for file {}: {}", id, e);
        }
    }

    fn run(&self, id: Uuid) {
        let record = match self.db.get(id) {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!("File {} no longer exists; skipping", id);
                return;
            }
            Err(e) => {
                tracing::error!("Failed to load file {}: {}", id, e);
                self.fail_unexpected(id, &format!("Failed to load file record: {}", e));
                return;
            }
        };

        let kind = self.detector.detect(&record.mime_type, &record.original_name);
        let ctx = ParseContext {
            path: self.blobs.local_path(&record.stored_path),
            original_name: record.original_name.clone(),
            file_size: record.file_size,
            mime_type: record.mime_type.clone(),
        };

        let mut tracker = ProgressTracker::new(record, self.db.clone(), self.channel.clone());
        tracker.begin();
        if tracker.is_abandoned() {
            return;
        }

        tracing::info!("Processing file {} ({}) as {:?}", id, ctx.original_name, kind);
        let start = std::time::Instant::now();

        let result = {
            let mut sink = |p: u8| tracker.checkpoint(p);
            self.parsers.parse(kind, &ctx, &mut sink)
        };

        match result {
            Ok(content) => {
                let kind = content.kind();
                tracker.complete(content);
                if !tracker.is_abandoned() {
                    tracing::info!(
                        "File {} ready ({} content) in {:.2}s",
                        id,
                        kind,
                        start.elapsed().as_secs_f64()
                    );
                }
            }
            Err(e) => {
                tracing::warn!("Parsing file {} failed: {}", id, e);
                tracker.fail(e.to_string());
            }
        }
    }

    /// Fail a record after a fault outside the parser, unless it already finished
    pub fn fail_unexpected(&self, id: Uuid, message: &str) {
        match self.db.get(id) {
            Ok(Some(record)) if !record.is_terminal() => {
                let mut tracker = ProgressTracker::new(record, self.db.clone(), self.channel.clone());
                tracker.fail(message);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("File {} cannot be loaded ({}); failing it in place", id, e);
                match self.db.mark_failed(id, message) {
                    Ok(Some(progress)) => self.channel.set(
                        id,
                        FileStatus::Failed,
                        progress,
                        Some(message.to_string()),
                    ),
                    Ok(None) => {}
                    Err(e) => tracing::error!("Failed to mark file {} failed: {}", id, e),
                }
            }
        }
    }
}

/// Describe why a task did not complete
pub fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string()),
        Err(err) => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::MemoryProgressStore;
    use crate::types::ProgressSnapshot;

    /// Channel that lets a delete land right before the ready mirror
    struct DeleteBeforeReady {
        inner: MemoryProgressStore,
        db: FileRecordDb,
    }

    impl ProgressStore for DeleteBeforeReady {
        fn set(&self, id: Uuid, status: FileStatus, progress: u8, error: Option<String>) {
            if status == FileStatus::Ready {
                self.db.delete(id).unwrap();
                self.inner.remove(id);
            }
            self.inner.set(id, status, progress, error);
        }

        fn get(&self, id: Uuid) -> Option<ProgressSnapshot> {
            self.inner.get(id)
        }

        fn remove(&self, id: Uuid) {
            self.inner.remove(id);
        }
    }

    fn worker(db: &FileRecordDb, channel: Arc<dyn ProgressStore>) -> ProcessingWorker {
        ProcessingWorker::new(
            db.clone(),
            channel,
            Arc::new(crate::storage::LocalBlobStore::new(std::env::temp_dir()).unwrap()),
            FormatDetector::default(),
            FileParser::default(),
        )
    }

    fn setup() -> (FileRecordDb, Arc<MemoryProgressStore>, FileRecord) {
        let db = FileRecordDb::in_memory().unwrap();
        let channel = Arc::new(MemoryProgressStore::new(3600));
        let record = FileRecord::new(Uuid::new_v4(), "alice", "a.csv", "/tmp/a.csv", 3, "text/csv");
        db.insert(&record).unwrap();
        (db, channel, record)
    }

    #[test]
    fn test_tracker_writes_through() {
        let (db, channel, record) = setup();
        let id = record.id;
        let mut tracker = ProgressTracker::new(record, db.clone(), channel.clone());

        tracker.begin();
        assert_eq!(db.get(id).unwrap().unwrap().progress, INITIAL_PROGRESS);
        assert_eq!(channel.get(id).unwrap().status, FileStatus::Processing);

        tracker.checkpoint(50);
        tracker.checkpoint(30);
        assert_eq!(db.get(id).unwrap().unwrap().progress, 50);
        assert_eq!(channel.get(id).unwrap().progress, 50);

        tracker.complete(ParsedDocument::text(Vec::new()));
        let stored = db.get(id).unwrap().unwrap();
        assert_eq!(stored.status, FileStatus::Ready);
        assert_eq!(stored.progress, 100);
        assert_eq!(channel.get(id).unwrap().status, FileStatus::Ready);
    }

    #[test]
    fn test_tracker_abandons_deleted_record() {
        let (db, channel, record) = setup();
        let id = record.id;
        let mut tracker = ProgressTracker::new(record, db.clone(), channel.clone());
        tracker.begin();

        db.delete(id).unwrap();
        tracker.checkpoint(60);
        assert!(tracker.is_abandoned());
        assert!(channel.get(id).is_none());

        tracker.fail("too late");
        assert!(db.get(id).unwrap().is_none());
        assert!(channel.get(id).is_none());
    }

    #[test]
    fn test_delete_between_update_and_mirror() {
        let (db, _, record) = setup();
        let id = record.id;
        let channel = Arc::new(DeleteBeforeReady {
            inner: MemoryProgressStore::new(3600),
            db: db.clone(),
        });
        let mut tracker = ProgressTracker::new(record, db.clone(), channel.clone());
        tracker.begin();
        assert!(channel.get(id).is_some());

        tracker.complete(ParsedDocument::text(Vec::new()));
        assert!(tracker.is_abandoned());
        assert!(db.get(id).unwrap().is_none());
        assert!(channel.get(id).is_none());
    }

    #[tokio::test]
    async fn test_unreadable_record_is_failed() {
        let (db, channel, record) = setup();
        let id = record.id;
        db.execute_raw(&format!(
            "UPDATE file_records SET created_at = 'garbage' WHERE id = '{}'",
            id
        ));

        worker(&db, channel.clone()).process(id).await;

        let snapshot = channel.get(id).unwrap();
        assert_eq!(snapshot.status, FileStatus::Failed);
        assert_eq!(snapshot.progress, 0);
        assert!(snapshot
            .error
            .unwrap()
            .starts_with("Failed to load file record"));

        db.execute_raw(&format!(
            "UPDATE file_records SET created_at = updated_at WHERE id = '{}'",
            id
        ));
        assert_eq!(db.get(id).unwrap().unwrap().status, FileStatus::Failed);
    }

    #[test]
    fn test_fail_unexpected_skips_finished_records() {
        let (db, channel, record) = setup();
        let id = record.id;
        let worker = worker(&db, channel.clone());

        let mut tracker = ProgressTracker::new(record, db.clone(), channel.clone());
        tracker.begin();
        tracker.complete(ParsedDocument::text(Vec::new()));

        worker.fail_unexpected(id, "boom");
        assert_eq!(db.get(id).unwrap().unwrap().status, FileStatus::Ready);
    }

    #[tokio::test]
    async fn test_panic_message() {
        let err = tokio::spawn(async { panic!("exploded") }).await.unwrap_err();
        assert_eq!(panic_message(err), "exploded");
    }
}
