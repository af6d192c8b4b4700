//! HTTP surface: the embedded UI page plus the JSON API it drives.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::batch::BatchReport;
use crate::document::UploadedFile;
use crate::error::{OcrError, OcrResult};
use crate::ocr::single::{self, OcrOutput};
use crate::ocr::OcrApi;
use crate::poller::{self, BatchProgress, PollSettings};
use crate::store::ResultStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no API key is configured.
    pub api: Option<Arc<dyn OcrApi>>,
    pub store: ResultStore,
    pub poll: PollSettings,
    pub ocr_model: String,
}

impl AppState {
    fn api(&self) -> OcrResult<Arc<dyn OcrApi>> {
        self.api.clone().ok_or(OcrError::MissingApiKey)
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/ocr", post(ocr_single))
        .route("/api/ocr/:id/download", get(download_single))
        .route("/api/batch", post(batch_submit))
        .route("/api/batch/:id", get(batch_status))
        .route("/api/batch/:id/cancel", post(batch_cancel))
        .route("/api/batch/:id/download", get(batch_download))
        .route("/api/batch/:id/results.jsonl", get(batch_results))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "api_key_configured": state.api.is_some(),
        "ocr_model": state.ocr_model,
    }))
}

#[derive(Deserialize)]
struct OcrQuery {
    structured: Option<bool>,
}

/// Run OCR on one uploaded PDF or image.
async fn ocr_single(
    State(state): State<AppState>,
    Query(query): Query<OcrQuery>,
    mut multipart: Multipart,
) -> OcrResult<Json<OcrOutput>> {
    let api = state.api()?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or("document").to_string();
            let data = field.bytes().await?.to_vec();
            upload = Some(UploadedFile::new(file_name, data)?);
            break;
        }
    }
    let file = upload.ok_or(OcrError::NoFiles)?;

    info!("Received file: {} ({} bytes)", file.file_name, file.data.len());
    let output =
        single::process_file(api.as_ref(), &file, query.structured.unwrap_or(false)).await?;
    let stored = state.store.insert_result(output);
    Ok(Json(stored.as_ref().clone()))
}

async fn download_single(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> OcrResult<Response> {
    let output = state.store.result(id)?;
    Ok(attachment(
        "text/plain; charset=utf-8",
        "ocr_text.txt",
        output.text.clone().into_bytes(),
    ))
}

#[derive(Serialize)]
struct BatchSubmitted {
    job_id: Uuid,
    file_count: usize,
}

/// Accept images and start a batch job in the background.
async fn batch_submit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> OcrResult<(StatusCode, Json<BatchSubmitted>)> {
    let api = state.api()?;

    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if matches!(field.name(), Some("files") | Some("file")) {
            let file_name = field.file_name().unwrap_or("image").to_string();
            let data = field.bytes().await?.to_vec();
            files.push(UploadedFile::new_image(file_name, data)?);
        }
    }
    if files.is_empty() {
        return Err(OcrError::NoFiles);
    }

    info!("Starting batch OCR for {} files", files.len());
    let handle = poller::spawn_batch(api, files, state.poll);
    let file_count = handle.file_names.len();
    let job_id = state.store.insert_batch(handle);

    Ok((StatusCode::ACCEPTED, Json(BatchSubmitted { job_id, file_count })))
}

#[derive(Serialize)]
struct BatchStatusResponse {
    job_id: Uuid,
    file_names: Vec<String>,
    progress: BatchProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<BatchReport>,
}

async fn batch_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> OcrResult<Json<BatchStatusResponse>> {
    let handle = state.store.batch(id)?;
    Ok(Json(BatchStatusResponse {
        job_id: id,
        file_names: handle.file_names.clone(),
        progress: handle.progress(),
        report: handle.outcome().map(|o| o.report.clone()),
    }))
}

async fn batch_cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> OcrResult<(StatusCode, Json<BatchProgress>)> {
    let handle = state.store.batch(id)?;
    handle.cancel();
    Ok((StatusCode::ACCEPTED, Json(handle.progress())))
}

async fn batch_download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> OcrResult<Response> {
    let outcome = finished_outcome(&state, id)?;
    Ok(attachment(
        "text/plain; charset=utf-8",
        "batch_ocr_text.txt",
        outcome.report.combined_text.clone().into_bytes(),
    ))
}

async fn batch_results(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> OcrResult<Response> {
    let outcome = finished_outcome(&state, id)?;
    Ok(attachment(
        "application/jsonl",
        "batch_ocr_results.jsonl",
        outcome.raw_results.clone(),
    ))
}

// ============================================================================
// Helpers
// ============================================================================

fn finished_outcome(state: &AppState, id: Uuid) -> OcrResult<Arc<poller::BatchOutcome>> {
    let handle = state.store.batch(id)?;
    if let Some(outcome) = handle.outcome() {
        return Ok(outcome);
    }
    let progress = handle.progress();
    if progress.phase.is_finished() {
        Err(OcrError::NoResults {
            id: id.to_string(),
            reason: progress.message.unwrap_or_default(),
        })
    } else {
        Err(OcrError::NotReady(id.to_string()))
    }
}

fn attachment(content_type: &'static str, file_name: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}
