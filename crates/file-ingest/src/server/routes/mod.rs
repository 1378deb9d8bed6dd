//! API routes for the ingestion server

pub mod files;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Build all API routes
pub fn api_routes(max_upload_size: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_upload_size.saturating_add(MULTIPART_OVERHEAD))
        .unwrap_or(usize::MAX);

    Router::new()
        // Upload - body limit sized so oversized files reach the size check
        .route(
            "/files",
            post(files::upload_file)
                .layer(DefaultBodyLimit::max(body_limit))
                .get(files::list_files),
        )
        .route("/files/:id", get(files::get_file).delete(files::delete_file))
        .route("/files/:id/progress", get(files::get_progress))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "file-ingest",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "File upload with background parsing and progress tracking",
        "owner_header": files::OWNER_HEADER,
        "endpoints": {
            "POST /api/files": "Upload a file (multipart field 'file')",
            "GET /api/files": "List your files, newest first",
            "GET /api/files/:id": "File detail with parsed content once ready",
            "DELETE /api/files/:id": "Delete a file",
            "GET /api/files/:id/progress": "Processing status and progress"
        },
        "formats": {
            "csv": "Delimited text, delimiter detected automatically",
            "spreadsheet": "First sheet of xlsx/xls workbooks",
            "pdf": "Text extracted page by page",
            "other": "Stored with metadata only"
        }
    }))
}
