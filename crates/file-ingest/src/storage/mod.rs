//! Storage module for persistent data storage
//!
//! SQLite persistence for file records and filesystem storage for raw bytes.

mod blob;
mod database;

pub use blob::{sanitize_filename, BlobStore, LocalBlobStore};
pub use database::FileRecordDb;
