//! File record types for tracking upload and parsing status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ParsedDocument;

/// Lifecycle status of an uploaded file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Record created, bytes stored, unit not started yet
    Uploading,
    /// Background unit is parsing the file
    Processing,
    /// Parsed content available
    Ready,
    /// Parsing failed
    Failed,
}

impl FileStatus {
    /// Name stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored status name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploading" => Some(Self::Uploading),
            "processing" => Some(Self::Processing),
            "ready" => Some(Self::Ready),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether processing has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of an uploaded file and its processing outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique record ID
    pub id: Uuid,
    /// Opaque reference to the uploading owner
    pub owner_id: String,
    /// Filename as declared by the client
    pub original_name: String,
    /// Filename under which the bytes were stored
    pub stored_name: String,
    /// Blob store path of the raw bytes
    pub stored_path: String,
    /// File size in bytes
    pub file_size: u64,
    /// Declared MIME type
    pub mime_type: String,
    /// Processing status
    pub status: FileStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Parsed content (ready only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_content: Option<ParsedDocument>,
    /// Error message (failed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the background unit picked the file up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
    /// When the upload was accepted
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Create a record for a freshly accepted upload
    pub fn new(
        id: Uuid,
        owner_id: impl Into<String>,
        original_name: impl Into<String>,
        stored_path: impl Into<String>,
        file_size: u64,
        mime_type: impl Into<String>,
    ) -> Self {
        let stored_path = stored_path.into();
        let stored_name = std::path::Path::new(&stored_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| stored_path.clone());
        let now = Utc::now();

        Self {
            id,
            owner_id: owner_id.into(),
            original_name: original_name.into(),
            stored_name,
            stored_path,
            file_size,
            mime_type: mime_type.into(),
            status: FileStatus::Uploading,
            progress: 0,
            parsed_content: None,
            error_message: None,
            processing_started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to processing at the initial checkpoint
    pub fn begin_processing(&mut self, progress: u8) {
        let now = Utc::now();
        self.status = FileStatus::Processing;
        self.processing_started_at = Some(now);
        self.set_progress(progress);
        self.updated_at = now;
    }

    /// Raise progress; lower values are ignored and values above 100 clipped.
    /// Returns whether the stored value changed.
    pub fn set_progress(&mut self, progress: u8) -> bool {
        let progress = progress.min(100);
        if self.status.is_terminal() || progress <= self.progress {
            return false;
        }
        self.progress = progress;
        self.updated_at = Utc::now();
        true
    }

    /// Mark as ready with parsed content
    pub fn mark_ready(&mut self, content: ParsedDocument) {
        self.status = FileStatus::Ready;
        self.progress = 100;
        self.parsed_content = Some(content);
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    /// Mark as failed, keeping the last progress value
    pub fn mark_failed(&mut self, error_message: impl Into<String>) {
        self.status = FileStatus::Failed;
        self.error_message = Some(error_message.into());
        self.parsed_content = None;
        self.updated_at = Utc::now();
    }

    /// Whether processing has finished
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Current status as a progress snapshot
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            status: self.status,
            progress: self.progress,
            error: self.error_message.clone(),
        }
    }
}

/// Status and progress of a file at one point in time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub status: FileStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// File listing entry, without parsed content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub id: Uuid,
    pub original_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub status: FileStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&FileRecord> for FileSummary {
    fn from(record: &FileRecord) -> Self {
        Self {
            id: record.id,
            original_name: record.original_name.clone(),
            file_size: record.file_size,
            mime_type: record.mime_type.clone(),
            status: record.status,
            progress: record.progress,
            error_message: record.error_message.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Detail view of a file, shaped by its status
#[derive(Debug, Clone, PartialEq)]
pub enum FileDetail {
    /// Still uploading or processing; no content exposed
    InProgress { status: FileStatus, progress: u8 },
    /// Processing failed
    Failed { error: String },
    /// Parsed content available
    Ready { content: ParsedDocument },
}

impl From<FileRecord> for FileDetail {
    fn from(record: FileRecord) -> Self {
        match (record.status, record.parsed_content, record.error_message) {
            (FileStatus::Ready, Some(content), _) => Self::Ready { content },
            (FileStatus::Failed, _, error) => Self::Failed {
                error: error.unwrap_or_else(|| "Unknown error".to_string()),
            },
            (status, _, _) => Self::InProgress {
                status,
                progress: record.progress,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FileRecord {
        FileRecord::new(
            Uuid::new_v4(),
            "alice",
            "people.csv",
            "/tmp/uploads/abc_people.csv",
            42,
            "text/csv",
        )
    }

    #[test]
    fn test_new_record() {
        let r = record();
        assert_eq!(r.status, FileStatus::Uploading);
        assert_eq!(r.progress, 0);
        assert_eq!(r.stored_name, "abc_people.csv");
        assert!(r.parsed_content.is_none());
        assert!(r.error_message.is_none());
    }

    #[test]
    fn test_progress_monotonic_and_clipped() {
        let mut r = record();
        r.begin_processing(10);
        assert!(r.set_progress(50));
        assert!(!r.set_progress(30));
        assert_eq!(r.progress, 50);
        assert!(r.set_progress(250));
        assert_eq!(r.progress, 100);
    }

    #[test]
    fn test_mark_failed_keeps_progress() {
        let mut r = record();
        r.begin_processing(10);
        r.set_progress(30);
        r.mark_failed("broken page");

        assert_eq!(r.status, FileStatus::Failed);
        assert_eq!(r.progress, 30);
        assert!(!r.set_progress(60));
        assert_eq!(
            FileDetail::from(r),
            FileDetail::Failed { error: "broken page".into() }
        );
    }

    #[test]
    fn test_detail_in_progress_hides_content() {
        let mut r = record();
        r.begin_processing(10);
        match FileDetail::from(r) {
            FileDetail::InProgress { status, progress } => {
                assert_eq!(status, FileStatus::Processing);
                assert_eq!(progress, 10);
            }
            other => panic!("unexpected detail: {:?}", other),
        }
    }

    #[test]
    fn test_status_names_round_trip() {
        for status in [
            FileStatus::Uploading,
            FileStatus::Processing,
            FileStatus::Ready,
            FileStatus::Failed,
        ] {
            assert_eq!(FileStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FileStatus::parse("done"), None);
    }
}
