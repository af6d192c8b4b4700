//! Scripted in-process [`OcrApi`] for flow and router tests.

use super::{FilePurpose, OcrApi, OcrDocument, OcrPage, OcrResponse, StructuredOcr};
use crate::batch::{BatchJob, BatchStatus};
use crate::error::{OcrError, OcrResult};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeOcrApi {
    calls: Mutex<Vec<String>>,
    pages: Vec<OcrPage>,
    statuses: Mutex<VecDeque<BatchStatus>>,
    output: Vec<u8>,
    error_output: Option<Vec<u8>>,
    uploads: Mutex<Vec<(String, Vec<u8>)>>,
    fail_polls: bool,
}

impl FakeOcrApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(mut self, pages: &[&str]) -> Self {
        self.pages = pages
            .iter()
            .enumerate()
            .map(|(i, md)| OcrPage {
                index: i as u32,
                markdown: md.to_string(),
            })
            .collect();
        self
    }

    /// Statuses returned by successive polls; the last one repeats.
    pub fn with_statuses(self, statuses: Vec<BatchStatus>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    pub fn with_output(mut self, output: impl Into<Vec<u8>>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_error_output(mut self, output: impl Into<Vec<u8>>) -> Self {
        self.error_output = Some(output.into());
        self
    }

    /// Make every status poll fail with a provider error.
    pub fn failing_polls(mut self) -> Self {
        self.fail_polls = true;
        self
    }

    /// Names of the operations invoked so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.uploads.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn job(&self, status: BatchStatus) -> BatchJob {
        BatchJob {
            id: "job-1".to_string(),
            total_requests: 2,
            succeeded_requests: if status.is_success() { 2 } else { 0 },
            failed_requests: 0,
            output_file: status.is_success().then(|| "output-1".to_string()),
            error_file: (status.is_success() && self.error_output.is_some())
                .then(|| "errors-1".to_string()),
            status,
        }
    }
}

#[async_trait::async_trait]
impl OcrApi for FakeOcrApi {
    async fn upload_file(
        &self,
        file_name: &str,
        _mime_type: &str,
        data: Vec<u8>,
        purpose: FilePurpose,
    ) -> OcrResult<String> {
        self.record(&format!("upload:{}", purpose.as_str()));
        self.uploads.lock().unwrap().push((file_name.to_string(), data));
        Ok(format!("file-{}", file_name))
    }

    async fn signed_url(&self, file_id: &str, _expiry_hours: u32) -> OcrResult<String> {
        self.record("signed_url");
        Ok(format!("https://signed.example/{}", file_id))
    }

    async fn download_file(&self, file_id: &str) -> OcrResult<Vec<u8>> {
        self.record(&format!("download:{}", file_id));
        match file_id {
            "output-1" => Ok(self.output.clone()),
            "errors-1" => Ok(self.error_output.clone().unwrap_or_default()),
            other => Err(OcrError::Api {
                status: 404,
                body: format!("no file {}", other),
            }),
        }
    }

    async fn ocr(&self, document: OcrDocument) -> OcrResult<OcrResponse> {
        let kind = match document {
            OcrDocument::DocumentUrl { .. } => "document_url",
            OcrDocument::ImageUrl { .. } => "image_url",
        };
        self.record(&format!("ocr:{}", kind));
        Ok(OcrResponse {
            pages: self.pages.clone(),
            model: Some("mistral-ocr-latest".to_string()),
        })
    }

    async fn annotate(&self, _image_url: &str, markdown: &str) -> OcrResult<StructuredOcr> {
        self.record("annotate");
        Ok(StructuredOcr {
            file_name: "guessed-by-model".to_string(),
            topics: vec!["receipt".to_string()],
            languages: vec!["English".to_string()],
            ocr_contents: serde_json::json!({ "text": markdown }),
        })
    }

    async fn create_batch_job(
        &self,
        _input_file_id: &str,
        _metadata: HashMap<String, String>,
    ) -> OcrResult<BatchJob> {
        self.record("create_batch_job");
        Ok(self.job(BatchStatus::Queued))
    }

    async fn get_batch_job(&self, _job_id: &str) -> OcrResult<BatchJob> {
        self.record("get_batch_job");
        if self.fail_polls {
            return Err(OcrError::Api {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let status = {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().cloned()
            }
        }
        .unwrap_or(BatchStatus::Running);
        Ok(self.job(status))
    }

    async fn cancel_batch_job(&self, _job_id: &str) -> OcrResult<BatchJob> {
        self.record("cancel_batch_job");
        Ok(self.job(BatchStatus::CancellationRequested))
    }
}
