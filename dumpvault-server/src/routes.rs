use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use dumpvault::{BackupArtifact, Error, JobOutcome, JobTicket};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::server::AppState;

/// Acknowledgement returned by the submission endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobAccepted {
    pub message: String,
    pub job_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportParams {
    #[serde(rename = "fileName", default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobsList {
    pub pending: usize,
    pub jobs: Vec<JobOutcome>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilesList {
    pub files: Vec<BackupArtifact>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn submission_error(err: Error) -> ApiError {
    match err {
        Error::QueueClosed => api_error(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        other => {
            tracing::error!("Job submission failed: {}", other);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

fn accepted(ticket: JobTicket, message: &str) -> (StatusCode, Json<JobAccepted>) {
    (
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            message: message.to_string(),
            job_id: ticket.id,
        }),
    )
}

/// GET /rest/v1/backup/exportDb
pub async fn export_db(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let ticket = state.queue.submit_export().await.map_err(submission_error)?;
    Ok(accepted(
        ticket,
        "Database export started. Check the backup directory for the output",
    ))
}

/// POST /rest/v1/backup/importDb?fileName=...
pub async fn import_db(
    State(state): State<AppState>,
    Query(params): Query<ImportParams>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let file_name = params
        .file_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "fileName is required"))?;

    let ticket = state
        .queue
        .submit_import(file_name)
        .await
        .map_err(submission_error)?;
    Ok(accepted(ticket, "Database import started"))
}

/// GET /rest/v1/backup/jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<JobsList> {
    Json(JobsList {
        pending: state.queue.pending(),
        jobs: state.recent.list(),
    })
}

/// GET /rest/v1/backup/jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobOutcome>, StatusCode> {
    state.recent.get(id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// GET /rest/v1/backup/files
pub async fn list_files(State(state): State<AppState>) -> Result<Json<FilesList>, ApiError> {
    let files = state.store.list().await.map_err(|e| {
        tracing::error!("Failed to list backup directory: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(Json(FilesList { files }))
}

pub async fn health(State(state): State<AppState>) -> StatusCode {
    if state.queue.is_closed() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

/// GET /metrics in Prometheus text format.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics {
        Some(ref handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            "metrics disabled\n".to_string(),
        ),
    }
}
