//! Error type shared by the OCR and batch flows.
//!
//! Every failure ends the current operation and is rendered to the user as a
//! JSON `{ "error", "code" }` body. Nothing here is retried.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::warn;

use crate::batch::BatchStatus;

pub type OcrResult<T> = std::result::Result<T, OcrError>;

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("MISTRAL_API_KEY not found in environment. Please set it in your .env file.")]
    MissingApiKey,

    #[error("Unsupported file type '{file_name}'. Allowed extensions: {allowed}")]
    UnsupportedFileType {
        file_name: String,
        allowed: &'static str,
    },

    #[error("Uploaded file '{0}' is empty")]
    EmptyFile(String),

    #[error("Please upload a file before starting the OCR process.")]
    NoFiles,

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("OCR API rejected the credentials ({status}): {body}")]
    Authentication { status: u16, body: String },

    #[error("OCR API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Network error talking to the OCR API: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed response from the OCR API: {0}")]
    Decode(String),

    #[error("No OCR text found in '{0}'")]
    NoText(String),

    #[error("Batch job {job_id} ended with status: {status}")]
    BatchFailed { job_id: String, status: BatchStatus },

    #[error("Batch job {job_id} did not finish within {waited_secs}s")]
    PollTimeout { job_id: String, waited_secs: u64 },

    #[error("Batch job was cancelled")]
    Cancelled,

    #[error("Batch job {0} has not finished yet")]
    NotReady(String),

    #[error("Batch job {id} produced no results: {reason}")]
    NoResults { id: String, reason: String },

    #[error("Unknown {kind} id: {id}")]
    NotFound { kind: &'static str, id: String },
}

impl OcrError {
    /// HTTP status used when this error reaches a handler boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingApiKey => StatusCode::SERVICE_UNAVAILABLE,
            Self::UnsupportedFileType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::EmptyFile(_) | Self::NoFiles | Self::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            Self::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Self::Api { .. } | Self::Network(_) | Self::Decode(_) => StatusCode::BAD_GATEWAY,
            Self::NoText(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BatchFailed { .. }
            | Self::Cancelled
            | Self::NotReady(_)
            | Self::NoResults { .. } => StatusCode::CONFLICT,
            Self::PollTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    /// Stable machine-readable code for the UI.
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::MissingApiKey => "missing_api_key",
            Self::UnsupportedFileType { .. } => "unsupported_file_type",
            Self::EmptyFile(_) => "empty_file",
            Self::NoFiles => "no_files",
            Self::InvalidUpload(_) => "invalid_upload",
            Self::Authentication { .. } => "authentication_failed",
            Self::Api { .. } => "api_error",
            Self::Network(_) => "network_error",
            Self::Decode(_) => "malformed_response",
            Self::NoText(_) => "no_text",
            Self::BatchFailed { .. } => "batch_failed",
            Self::PollTimeout { .. } => "poll_timeout",
            Self::Cancelled => "cancelled",
            Self::NotReady(_) => "not_ready",
            Self::NoResults { .. } => "no_results",
            Self::NotFound { .. } => "not_found",
        }
    }

    /// Classify a non-success HTTP reply from the provider.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Authentication { status, body },
            _ => Self::Api { status, body },
        }
    }
}

impl From<MultipartError> for OcrError {
    fn from(err: MultipartError) -> Self {
        Self::InvalidUpload(err.body_text())
    }
}

impl From<serde_json::Error> for OcrError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl IntoResponse for OcrError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        warn!(code = self.error_code(), "Request failed: {}", self);
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": self.error_code(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_statuses_classified() {
        assert!(matches!(
            OcrError::from_status(401, "nope".into()),
            OcrError::Authentication { status: 401, .. }
        ));
        assert!(matches!(
            OcrError::from_status(403, String::new()),
            OcrError::Authentication { .. }
        ));
        assert!(matches!(
            OcrError::from_status(422, "bad doc".into()),
            OcrError::Api { status: 422, .. }
        ));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            OcrError::MissingApiKey.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let unsupported = OcrError::UnsupportedFileType {
            file_name: "notes.txt".into(),
            allowed: "pdf, png",
        };
        assert_eq!(unsupported.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(unsupported.error_code(), "unsupported_file_type");
        assert!(unsupported.to_string().contains("notes.txt"));
    }
}
