//! File upload, status and management endpoints

use axum::{
    async_trait,
    extract::{FromRequestParts, Multipart, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{FileDetail, FileStatus, FileSummary, ParsedDocument};

/// Header carrying the caller's owner reference
pub const OWNER_HEADER: &str = "x-owner-id";

/// Multipart field holding the uploaded file
const FILE_FIELD: &str = "file";

/// Owner reference of the calling client
#[derive(Debug, Clone)]
pub struct Owner(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Owner(v.to_string()))
            .ok_or(Error::MissingOwner)
    }
}

/// Response for an accepted upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file_id: Uuid,
    pub message: String,
    pub status: FileStatus,
    pub progress: u8,
}

/// Response for file list
#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileSummary>,
    pub total: usize,
}

/// Response for progress polling
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub file_id: Uuid,
    pub status: FileStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct PendingBody {
    file_id: Uuid,
    status: FileStatus,
    progress: u8,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct FailedBody {
    file_id: Uuid,
    status: FileStatus,
    error_message: String,
}

#[derive(Debug, Serialize)]
struct ReadyBody {
    #[serde(flatten)]
    file: FileSummary,
    content: ParsedDocument,
}

/// POST /api/files - Upload a file for background parsing
pub async fn upload_file(
    State(state): State<AppState>,
    Owner(owner): Owner,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let is_file = field.name() == Some(FILE_FIELD) || field.file_name().is_some();
        if !is_file {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("file_{}.bin", Uuid::new_v4()));
        let content_type = field.content_type().map(|s| s.to_string());

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::BadRequest(format!("Failed to read file {}: {}", filename, e)))?;

        tracing::info!("Received upload: {} ({} bytes)", filename, data.len());

        let submission = state
            .orchestrator()
            .accept_upload(&owner, &filename, content_type.as_deref(), &data)
            .await?;

        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                file_id: submission.record.id,
                message: "File uploaded successfully. Processing started.".to_string(),
                status: submission.record.status,
                progress: submission.record.progress,
            }),
        ));
    }

    Err(Error::BadRequest("No file provided".to_string()))
}

/// GET /api/files - List the caller's files, newest first
pub async fn list_files(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Result<Json<FileListResponse>> {
    let files = state.status().list(&owner)?;
    let total = files.len();
    Ok(Json(FileListResponse { files, total }))
}

/// GET /api/files/:id - File detail, shaped by processing status
pub async fn get_file(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let record = state.status().get_record(id, &owner)?;
    let summary = FileSummary::from(&record);

    let response = match FileDetail::from(record) {
        FileDetail::InProgress { status, progress } => (
            StatusCode::ACCEPTED,
            Json(PendingBody {
                file_id: id,
                status,
                progress,
                message: "File is still being processed",
            }),
        )
            .into_response(),
        FileDetail::Failed { error } => (
            StatusCode::BAD_REQUEST,
            Json(FailedBody {
                file_id: id,
                status: FileStatus::Failed,
                error_message: error,
            }),
        )
            .into_response(),
        FileDetail::Ready { content } => (
            StatusCode::OK,
            Json(ReadyBody {
                file: summary,
                content,
            }),
        )
            .into_response(),
    };

    Ok(response)
}

/// DELETE /api/files/:id - Remove a file, its bytes and its progress entry
pub async fn delete_file(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.status().delete(id, &owner).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/files/:id/progress - Current status and progress
pub async fn get_progress(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<Uuid>,
) -> Result<Json<ProgressResponse>> {
    let snapshot = state.status().get_status(id, &owner)?;
    Ok(Json(ProgressResponse {
        file_id: id,
        status: snapshot.status,
        progress: snapshot.progress,
        error: snapshot.error,
    }))
}
