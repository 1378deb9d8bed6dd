//! Background processing and status queries

mod orchestrator;
mod query;
mod worker;

pub use orchestrator::{IngestOrchestrator, Submission, DEFAULT_MIME_TYPE};
pub use query::StatusService;
pub use worker::{ProcessingWorker, ProgressTracker, INITIAL_PROGRESS, PARSED_PROGRESS};
