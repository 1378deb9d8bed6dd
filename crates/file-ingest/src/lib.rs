//! file-ingest: asynchronous file ingestion with progress tracking
//!
//! Uploaded files are stored, classified by format and parsed in background
//! units. CSV, spreadsheet and PDF files yield structured content; anything
//! else is recorded with its metadata. Progress is written to a SQLite record
//! store and mirrored to an expiring in-memory channel for fast polling.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod processing;
pub mod progress;
pub mod server;
pub mod storage;
pub mod types;

pub use config::IngestConfig;
pub use error::{Error, Result};
pub use processing::{IngestOrchestrator, StatusService, Submission};
pub use types::{FileDetail, FileRecord, FileStatus, ParsedDocument};
