//! Status, detail, listing and deletion of file records

use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::progress::ProgressStore;
use crate::storage::{BlobStore, FileRecordDb};
use crate::types::{FileDetail, FileRecord, FileSummary, ProgressSnapshot};

/// Read side of the pipeline, plus deletion
#[derive(Clone)]
pub struct StatusService {
    db: FileRecordDb,
    channel: Arc<dyn ProgressStore>,
    blobs: Arc<dyn BlobStore>,
}

impl StatusService {
    pub fn new(db: FileRecordDb, channel: Arc<dyn ProgressStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, channel, blobs }
    }

    /// Current status and progress.
    ///
    /// The progress channel answers first without an ownership check, since
    /// file ids are unguessable. Otherwise the record store answers, and
    /// only for the owner.
    pub fn get_status(&self, id: Uuid, requester: &str) -> Result<ProgressSnapshot> {
        if let Some(snapshot) = self.channel.get(id) {
            return Ok(snapshot);
        }
        Ok(self.owned(id, requester)?.snapshot())
    }

    /// Full record, for the owner only
    pub fn get_record(&self, id: Uuid, requester: &str) -> Result<FileRecord> {
        self.owned(id, requester)
    }

    /// Status-shaped detail view
    pub fn get_detail(&self, id: Uuid, requester: &str) -> Result<FileDetail> {
        Ok(FileDetail::from(self.owned(id, requester)?))
    }

    /// The requester's files, newest first
    pub fn list(&self, requester: &str) -> Result<Vec<FileSummary>> {
        let records = self.db.list_by_owner(requester)?;
        Ok(records.iter().map(FileSummary::from).collect())
    }

    /// Remove the record, its stored bytes and its progress entry
    pub async fn delete(&self, id: Uuid, requester: &str) -> Result<()> {
        let record = self.owned(id, requester)?;

        if !self.db.delete(id)? {
            return Err(Error::not_found(id));
        }
        self.channel.remove(id);

        if let Err(e) = self.blobs.delete(&record.stored_path).await {
            tracing::warn!("Deleted file {} but not its bytes: {}", id, e);
        }

        tracing::info!("Deleted file {} ({})", id, record.original_name);
        Ok(())
    }

    fn owned(&self, id: Uuid, requester: &str) -> Result<FileRecord> {
        self.db
            .get_owned(id, requester)?
            .ok_or_else(|| Error::not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::MemoryProgressStore;
    use crate::storage::LocalBlobStore;
    use crate::types::{FileStatus, ParsedDocument};

    struct Fixture {
        _dir: tempfile::TempDir,
        db: FileRecordDb,
        channel: Arc<MemoryProgressStore>,
        blobs: Arc<LocalBlobStore>,
        service: StatusService,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = FileRecordDb::in_memory().unwrap();
        let channel = Arc::new(MemoryProgressStore::new(3600));
        let blobs = Arc::new(LocalBlobStore::new(dir.path()).unwrap());
        let service = StatusService::new(db.clone(), channel.clone(), blobs.clone());
        Fixture {
            _dir: dir,
            db,
            channel,
            blobs,
            service,
        }
    }

    async fn stored_record(f: &Fixture, owner: &str) -> FileRecord {
        let id = Uuid::new_v4();
        let path = f.blobs.store(id, "a.csv", b"a,b\n").await.unwrap();
        let record = FileRecord::new(id, owner, "a.csv", path, 4, "text/csv");
        f.db.insert(&record).unwrap();
        record
    }

    #[tokio::test]
    async fn test_status_fast_and_slow_paths() {
        let f = fixture();
        let record = stored_record(&f, "alice").await;
        let id = record.id;

        // slow path enforces ownership
        assert_eq!(f.service.get_status(id, "alice").unwrap().status, FileStatus::Uploading);
        assert!(matches!(f.service.get_status(id, "bob"), Err(Error::NotFound(_))));

        // fast path answers from the channel
        f.channel.set(id, FileStatus::Processing, 50, None);
        let snapshot = f.service.get_status(id, "bob").unwrap();
        assert_eq!(snapshot.status, FileStatus::Processing);
        assert_eq!(snapshot.progress, 50);

        assert!(matches!(
            f.service.get_status(Uuid::new_v4(), "alice"),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_detail_by_status() {
        let f = fixture();
        let mut record = stored_record(&f, "alice").await;

        assert_eq!(
            f.service.get_detail(record.id, "alice").unwrap(),
            FileDetail::InProgress {
                status: FileStatus::Uploading,
                progress: 0
            }
        );

        record.begin_processing(10);
        record.mark_ready(ParsedDocument::opaque("a.csv", 4, "text/csv"));
        f.db.update(&record).unwrap();
        assert!(matches!(
            f.service.get_detail(record.id, "alice").unwrap(),
            FileDetail::Ready { .. }
        ));
        assert!(matches!(
            f.service.get_detail(record.id, "bob"),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let f = fixture();
        let first = stored_record(&f, "alice").await;
        let second = stored_record(&f, "alice").await;
        stored_record(&f, "bob").await;

        let ids: Vec<Uuid> = f.service.list("alice").unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert!(f.service.list("carol").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let f = fixture();
        let record = stored_record(&f, "alice").await;
        let id = record.id;
        f.channel.set(id, FileStatus::Ready, 100, None);
        let path = f.blobs.local_path(&record.stored_path);
        assert!(path.exists());

        f.service.delete(id, "alice").await.unwrap();

        assert!(f.db.get(id).unwrap().is_none());
        assert!(f.channel.get(id).is_none());
        assert!(!path.exists());
        assert!(matches!(f.service.delete(id, "alice").await, Err(Error::NotFound(_))));
    }
}
