//! SQLite database for persistent file record storage

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{FileRecord, FileStatus, ParsedDocument};

const RECORD_COLUMNS: &str = "id, owner_id, original_name, stored_name, stored_path, file_size, \
     mime_type, status, progress, parsed_content, error_message, processing_started_at, \
     created_at, updated_at";

/// SQLite-based file record store
#[derive(Clone)]
pub struct FileRecordDb {
    conn: Arc<Mutex<Connection>>,
}

impl FileRecordDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::database(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::database(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::database(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::database(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS file_records (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                original_name TEXT NOT NULL,
                stored_name TEXT NOT NULL,
                stored_path TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                mime_type TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                parsed_content TEXT,
                error_message TEXT,
                processing_started_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_file_records_owner
                ON file_records(owner_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_file_records_status ON file_records(status);
        "#,
        )
        .map_err(|e| Error::database(format!("Failed to run migrations: {}", e)))?;

        tracing::debug!("Database migrations complete");
        Ok(())
    }

    /// Insert a new file record
    pub fn insert(&self, record: &FileRecord) -> Result<()> {
        let content = encode_content(record.parsed_content.as_ref())?;
        let conn = self.conn.lock();

        conn.execute(
            &format!(
                "INSERT INTO file_records ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                RECORD_COLUMNS
            ),
            params![
                record.id.to_string(),
                record.owner_id,
                record.original_name,
                record.stored_name,
                record.stored_path,
                record.file_size as i64,
                record.mime_type,
                record.status.as_str(),
                record.progress as i64,
                content,
                record.error_message,
                record.processing_started_at.map(format_time),
                format_time(record.created_at),
                format_time(record.updated_at),
            ],
        )
        .map_err(|e| Error::database(format!("Failed to insert file record: {}", e)))?;

        Ok(())
    }

    /// Persist the mutable fields of a record.
    /// Returns `false` when no row exists for the id.
    pub fn update(&self, record: &FileRecord) -> Result<bool> {
        let content = encode_content(record.parsed_content.as_ref())?;
        let conn = self.conn.lock();

        let count = conn
            .execute(
                r#"
                UPDATE file_records SET
                    status = ?2,
                    progress = ?3,
                    parsed_content = ?4,
                    error_message = ?5,
                    processing_started_at = ?6,
                    updated_at = ?7
                WHERE id = ?1
                "#,
                params![
                    record.id.to_string(),
                    record.status.as_str(),
                    record.progress as i64,
                    content,
                    record.error_message,
                    record.processing_started_at.map(format_time),
                    format_time(record.updated_at),
                ],
            )
            .map_err(|e| Error::database(format!("Failed to update file record: {}", e)))?;

        Ok(count > 0)
    }

    /// Mark an unfinished record failed without decoding it.
    /// Returns the kept progress, or `None` when no unfinished row matched.
    pub fn mark_failed(&self, id: Uuid, message: &str) -> Result<Option<u8>> {
        let conn = self.conn.lock();

        let progress: Option<i64> = conn
            .query_row(
                r#"
                UPDATE file_records SET
                    status = ?2,
                    error_message = ?3,
                    updated_at = ?4
                WHERE id = ?1 AND status NOT IN (?5, ?6)
                RETURNING progress
                "#,
                params![
                    id.to_string(),
                    FileStatus::Failed.as_str(),
                    message,
                    format_time(Utc::now()),
                    FileStatus::Ready.as_str(),
                    FileStatus::Failed.as_str(),
                ],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::database(format!("Failed to mark file record failed: {}", e)))?;

        Ok(progress.map(|p| p.clamp(0, 100) as u8))
    }

    /// Get a file record by id
    pub fn get(&self, id: Uuid) -> Result<Option<FileRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM file_records WHERE id = ?1", RECORD_COLUMNS))
            .map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let record = stmt
            .query_row(params![id.to_string()], row_to_file_record)
            .optional()
            .map_err(|e| Error::database(format!("Failed to get file record: {}", e)))?;

        Ok(record)
    }

    /// Whether a row exists for the id
    pub fn exists(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM file_records WHERE id = ?1)",
            params![id.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(format!("Failed to check file record: {}", e)))
    }

    /// Get a file record by id, only if `owner_id` owns it
    pub fn get_owned(&self, id: Uuid, owner_id: &str) -> Result<Option<FileRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM file_records WHERE id = ?1 AND owner_id = ?2",
                RECORD_COLUMNS
            ))
            .map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let record = stmt
            .query_row(params![id.to_string(), owner_id], row_to_file_record)
            .optional()
            .map_err(|e| Error::database(format!("Failed to get file record: {}", e)))?;

        Ok(record)
    }

    /// List an owner's records, newest first
    pub fn list_by_owner(&self, owner_id: &str) -> Result<Vec<FileRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM file_records WHERE owner_id = ?1 \
                 ORDER BY created_at DESC, rowid DESC",
                RECORD_COLUMNS
            ))
            .map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map(params![owner_id], row_to_file_record)
            .map_err(|e| Error::database(format!("Failed to list file records: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::database(format!("Failed to read file record: {}", e)))?;

        Ok(records)
    }

    /// Delete a file record
    pub fn delete(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();

        let count = conn
            .execute("DELETE FROM file_records WHERE id = ?1", params![id.to_string()])
            .map_err(|e| Error::database(format!("Failed to delete file record: {}", e)))?;

        Ok(count > 0)
    }

    /// Total number of records
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();

        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM file_records", [], |row| row.get(0))
            .map_err(|e| Error::database(format!("Failed to count file records: {}", e)))?;

        Ok(total as usize)
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) {
        self.conn.lock().execute_batch(sql).unwrap();
    }
}

/// Timestamps are stored as fixed-width RFC 3339 so text order is time order
fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn encode_content(content: Option<&ParsedDocument>) -> Result<Option<String>> {
    content
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::database(format!("Failed to encode parsed content: {}", e)))
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn row_to_file_record(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    let id_str: String = row.get(0)?;
    let file_size: i64 = row.get(5)?;
    let status_str: String = row.get(7)?;
    let progress: i64 = row.get(8)?;
    let content_json: Option<String> = row.get(9)?;
    let started_str: Option<String> = row.get(11)?;
    let created_str: String = row.get(12)?;
    let updated_str: String = row.get(13)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| conversion_error(0, e.to_string()))?;
    let status = FileStatus::parse(&status_str)
        .ok_or_else(|| conversion_error(7, format!("unknown status {:?}", status_str)))?;
    let parsed_content = content_json
        .map(|j| serde_json::from_str::<ParsedDocument>(&j))
        .transpose()
        .map_err(|e| conversion_error(9, e.to_string()))?;
    let created_at = parse_time(&created_str)
        .ok_or_else(|| conversion_error(12, format!("bad timestamp {:?}", created_str)))?;

    Ok(FileRecord {
        id,
        owner_id: row.get(1)?,
        original_name: row.get(2)?,
        stored_name: row.get(3)?,
        stored_path: row.get(4)?,
        file_size: file_size as u64,
        mime_type: row.get(6)?,
        status,
        progress: progress.clamp(0, 100) as u8,
        parsed_content,
        error_message: row.get(10)?,
        processing_started_at: started_str.as_deref().and_then(parse_time),
        created_at,
        updated_at: parse_time(&updated_str).unwrap_or(created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PageText, ParsedDocument};

    fn record(owner: &str, name: &str) -> FileRecord {
        FileRecord::new(
            Uuid::new_v4(),
            owner,
            name,
            format!("/uploads/x_{}", name),
            10,
            "text/csv",
        )
    }

    #[test]
    fn test_insert_and_get() {
        let db = FileRecordDb::in_memory().unwrap();
        let r = record("alice", "a.csv");
        db.insert(&r).unwrap();

        let got = db.get(r.id).unwrap().unwrap();
        assert_eq!(got.original_name, "a.csv");
        assert_eq!(got.stored_name, "x_a.csv");
        assert_eq!(got.status, FileStatus::Uploading);
        assert_eq!(format_time(got.created_at), format_time(r.created_at));
        assert!(db.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_update_round_trips_content() {
        let db = FileRecordDb::in_memory().unwrap();
        let mut r = record("alice", "doc.pdf");
        db.insert(&r).unwrap();

        r.begin_processing(10);
        r.mark_ready(ParsedDocument::text(vec![PageText {
            page_number: 1,
            text: "hi there".into(),
        }]));
        assert!(db.update(&r).unwrap());

        let got = db.get(r.id).unwrap().unwrap();
        assert_eq!(got.status, FileStatus::Ready);
        assert_eq!(got.progress, 100);
        assert_eq!(got.parsed_content, r.parsed_content);
        assert!(got.processing_started_at.is_some());
    }

    #[test]
    fn test_mark_failed_without_decoding() {
        let db = FileRecordDb::in_memory().unwrap();
        let mut r = record("alice", "a.csv");
        r.begin_processing(10);
        db.insert(&r).unwrap();
        db.execute_raw(&format!(
            "UPDATE file_records SET created_at = 'garbage' WHERE id = '{}'",
            r.id
        ));
        assert!(db.get(r.id).is_err());

        assert_eq!(db.mark_failed(r.id, "unreadable").unwrap(), Some(10));
        db.execute_raw(&format!(
            "UPDATE file_records SET created_at = '{}' WHERE id = '{}'",
            format_time(r.created_at),
            r.id
        ));
        let got = db.get(r.id).unwrap().unwrap();
        assert_eq!(got.status, FileStatus::Failed);
        assert_eq!(got.error_message.as_deref(), Some("unreadable"));

        // finished and missing rows are left alone
        assert_eq!(db.mark_failed(r.id, "again").unwrap(), None);
        assert_eq!(db.mark_failed(Uuid::new_v4(), "nothing").unwrap(), None);
    }

    #[test]
    fn test_update_missing_row() {
        let db = FileRecordDb::in_memory().unwrap();
        let r = record("alice", "gone.csv");
        assert!(!db.update(&r).unwrap());
    }

    #[test]
    fn test_ownership_and_listing() {
        let db = FileRecordDb::in_memory().unwrap();
        let first = record("alice", "1.csv");
        let second = record("alice", "2.csv");
        let other = record("bob", "3.csv");
        db.insert(&first).unwrap();
        db.insert(&second).unwrap();
        db.insert(&other).unwrap();

        assert!(db.get_owned(first.id, "alice").unwrap().is_some());
        assert!(db.get_owned(first.id, "bob").unwrap().is_none());

        let listed: Vec<String> = db
            .list_by_owner("alice")
            .unwrap()
            .into_iter()
            .map(|r| r.original_name)
            .collect();
        assert_eq!(listed, vec!["2.csv", "1.csv"]);
        assert_eq!(db.count().unwrap(), 3);
    }

    #[test]
    fn test_delete() {
        let db = FileRecordDb::in_memory().unwrap();
        let r = record("alice", "a.csv");
        db.insert(&r).unwrap();

        assert!(db.delete(r.id).unwrap());
        assert!(!db.delete(r.id).unwrap());
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn test_file_backed_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("files.db");
        let r = record("alice", "a.csv");
        {
            let db = FileRecordDb::new(&path).unwrap();
            db.insert(&r).unwrap();
        }
        let reopened = FileRecordDb::new(&path).unwrap();
        assert!(reopened.get(r.id).unwrap().is_some());
    }
}
