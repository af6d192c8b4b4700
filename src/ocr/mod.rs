//! OCR provider abstraction.
//!
//! [`OcrApi`] is the boundary to the remote service: every network call the
//! single-file and batch flows make goes through it, so the flows can be
//! exercised against an in-process fake.

pub mod mistral;
pub mod single;
pub mod structured;

#[cfg(test)]
pub mod fake;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::batch::BatchJob;
use crate::error::OcrResult;
pub use structured::StructuredOcr;

/// Document reference sent to the OCR endpoint (and embedded in batch lines).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OcrDocument {
    DocumentUrl { document_url: String },
    ImageUrl { image_url: String },
}

/// One page of provider output (0-indexed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrPage {
    pub index: u32,
    pub markdown: String,
}

/// Body of a `/v1/ocr` reply, also found inside batch output lines.
#[derive(Debug, Clone, Deserialize)]
pub struct OcrResponse {
    pub pages: Vec<OcrPage>,
    #[serde(default)]
    pub model: Option<String>,
}

impl OcrResponse {
    /// Concatenate page markdown separated by a blank line.
    pub fn joined_markdown(&self) -> String {
        join_pages(&self.pages)
    }
}

pub fn join_pages(pages: &[OcrPage]) -> String {
    pages
        .iter()
        .map(|p| p.markdown.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// What an uploaded file is for on the provider's file store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePurpose {
    Ocr,
    Batch,
}

impl FilePurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::Batch => "batch",
        }
    }
}

/// Remote OCR service operations.
#[async_trait::async_trait]
pub trait OcrApi: Send + Sync {
    /// Upload bytes to the file store, returning the provider's file id.
    async fn upload_file(
        &self,
        file_name: &str,
        mime_type: &str,
        data: Vec<u8>,
        purpose: FilePurpose,
    ) -> OcrResult<String>;

    /// Signed download URL for an uploaded file, valid for `expiry_hours`.
    async fn signed_url(&self, file_id: &str, expiry_hours: u32) -> OcrResult<String>;

    async fn download_file(&self, file_id: &str) -> OcrResult<Vec<u8>>;

    /// Synchronous OCR of a single document.
    async fn ocr(&self, document: OcrDocument) -> OcrResult<OcrResponse>;

    /// Turn an image and its OCR markdown into structured JSON.
    async fn annotate(&self, image_url: &str, markdown: &str) -> OcrResult<StructuredOcr>;

    async fn create_batch_job(
        &self,
        input_file_id: &str,
        metadata: HashMap<String, String>,
    ) -> OcrResult<BatchJob>;

    async fn get_batch_job(&self, job_id: &str) -> OcrResult<BatchJob>;

    async fn cancel_batch_job(&self, job_id: &str) -> OcrResult<BatchJob>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_serialization() {
        let doc = OcrDocument::ImageUrl {
            image_url: "data:image/png;base64,AA==".into(),
        };
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            serde_json::json!({"type": "image_url", "image_url": "data:image/png;base64,AA=="})
        );

        let doc = OcrDocument::DocumentUrl {
            document_url: "https://files/signed".into(),
        };
        assert_eq!(
            serde_json::to_value(&doc).unwrap()["type"],
            serde_json::json!("document_url")
        );
    }

    #[test]
    fn test_joined_markdown() {
        let response: OcrResponse = serde_json::from_str(
            r##"{"pages":[{"index":0,"markdown":"# Page one"},{"index":1,"markdown":"Page two"}],"model":"mistral-ocr-latest","usage_info":{}}"##,
        )
        .unwrap();
        assert_eq!(response.joined_markdown(), "# Page one\n\nPage two");
        assert_eq!(join_pages(&[]), "");
    }
}
