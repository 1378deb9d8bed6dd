//! Core types for the ingestion pipeline

pub mod document;
pub mod file_record;

pub use document::{PageText, ParsedDocument, Row, TabularFormat};
pub use file_record::{FileDetail, FileRecord, FileStatus, FileSummary, ProgressSnapshot};
