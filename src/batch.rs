//! Batch inference: JSONL manifest, job status, and result collation.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::document::UploadedFile;
use crate::error::OcrResult;
use crate::ocr::{OcrDocument, OcrResponse};

pub const OCR_ENDPOINT: &str = "/v1/ocr";
pub const MANIFEST_FILE_NAME: &str = "batch_file.jsonl";

// ============================================================================
// Job status
// ============================================================================

/// Provider-defined job status. Unknown strings are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BatchStatus {
    Queued,
    Running,
    Success,
    Failed,
    TimeoutExceeded,
    CancellationRequested,
    Cancelled,
    Other(String),
}

impl BatchStatus {
    /// Whether polling can stop.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::Queued | Self::Running | Self::CancellationRequested
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::TimeoutExceeded => "TIMEOUT_EXCEEDED",
            Self::CancellationRequested => "CANCELLATION_REQUESTED",
            Self::Cancelled => "CANCELLED",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for BatchStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "QUEUED" => Self::Queued,
            "RUNNING" => Self::Running,
            "SUCCESS" | "COMPLETED" => Self::Success,
            "FAILED" => Self::Failed,
            "TIMEOUT_EXCEEDED" => Self::TimeoutExceeded,
            "CANCELLATION_REQUESTED" => Self::CancellationRequested,
            "CANCELLED" => Self::Cancelled,
            _ => Self::Other(s),
        }
    }
}

impl From<BatchStatus> for String {
    fn from(status: BatchStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job handle as returned by the batch endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: String,
    pub status: BatchStatus,
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub succeeded_requests: u64,
    #[serde(default)]
    pub failed_requests: u64,
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default)]
    pub error_file: Option<String>,
}

impl BatchJob {
    /// Share of requests finished, in percent, rounded to two decimals.
    pub fn percent_done(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        let done = (self.succeeded_requests + self.failed_requests) as f64;
        (done / self.total_requests as f64 * 10000.0).round() / 100.0
    }
}

// ============================================================================
// Manifest
// ============================================================================

#[derive(Debug, Serialize)]
struct ManifestLine<'a> {
    custom_id: String,
    body: ManifestBody<'a>,
}

#[derive(Debug, Serialize)]
struct ManifestBody<'a> {
    document: &'a OcrDocument,
    include_image_base64: bool,
}

/// Build the JSONL manifest: one OCR request per file, `custom_id` = index.
pub fn build_manifest(files: &[UploadedFile]) -> OcrResult<Vec<u8>> {
    let mut out = Vec::new();
    for (index, file) in files.iter().enumerate() {
        let document = OcrDocument::ImageUrl {
            image_url: file.data_url(),
        };
        let line = ManifestLine {
            custom_id: index.to_string(),
            body: ManifestBody {
                document: &document,
                include_image_base64: false,
            },
        };
        serde_json::to_writer(&mut out, &line)?;
        out.push(b'\n');
    }
    debug!("Built batch manifest: {} lines, {} bytes", files.len(), out.len());
    Ok(out)
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Deserialize)]
struct OutputLine {
    custom_id: String,
    #[serde(default)]
    response: Option<OutputResponse>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OutputResponse {
    status_code: u16,
    #[serde(default)]
    body: serde_json::Value,
}

/// Per-file outcome of a batch, in upload order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    pub index: usize,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
    /// Exactly what the UI displays and the text download serves.
    pub combined_text: String,
}

impl BatchReport {
    pub fn new(entries: Vec<BatchEntry>) -> Self {
        let combined_text = render_combined(&entries);
        Self {
            entries,
            combined_text,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.error.is_some()).count()
    }
}

fn render_combined(entries: &[BatchEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            let body = match (&entry.text, &entry.error) {
                (Some(text), _) => text.clone(),
                (None, Some(error)) => format!("[OCR failed: {}]", error),
                (None, None) => "[no result]".to_string(),
            };
            format!("=== {} ===\n{}", entry.file_name, body)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Match output (and error) file lines back to uploaded files.
///
/// Every uploaded file gets exactly one entry; files the provider never
/// reported on get an error entry. A malformed line only affects the file it
/// belongs to, or is skipped when its `custom_id` cannot be recovered.
pub fn collect_report(file_names: &[String], output: &[u8], errors: Option<&[u8]>) -> BatchReport {
    let mut entries: Vec<BatchEntry> = file_names
        .iter()
        .enumerate()
        .map(|(index, name)| BatchEntry {
            index,
            file_name: name.clone(),
            text: None,
            error: None,
        })
        .collect();

    let error_lines = errors.unwrap_or_default();
    for raw in [output, error_lines] {
        let text = String::from_utf8_lossy(raw);
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let (custom_id, outcome) = match serde_json::from_str::<OutputLine>(line) {
                Ok(parsed) => (parsed.custom_id.clone(), line_outcome(parsed)),
                Err(e) => match recover_custom_id(line) {
                    Some(id) => (id, Err(format!("malformed result line: {}", e))),
                    None => {
                        warn!("Skipping malformed batch result line: {}", e);
                        continue;
                    }
                },
            };
            let Some(entry) = custom_id.parse::<usize>().ok().and_then(|i| entries.get_mut(i))
            else {
                warn!("Ignoring batch result with unknown custom_id {:?}", custom_id);
                continue;
            };
            if entry.text.is_some() {
                continue;
            }
            match outcome {
                Ok(text) => {
                    entry.text = Some(text);
                    entry.error = None;
                }
                Err(message) => entry.error = Some(message),
            }
        }
    }

    for entry in entries.iter_mut().filter(|e| e.text.is_none() && e.error.is_none()) {
        entry.error = Some("no result returned for this file".to_string());
    }

    BatchReport::new(entries)
}

fn recover_custom_id(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    value.get("custom_id")?.as_str().map(str::to_string)
}

fn line_outcome(line: OutputLine) -> Result<String, String> {
    if let Some(error) = line.error.filter(|e| !e.is_null()) {
        return Err(error_message(&error));
    }
    let response = line
        .response
        .ok_or_else(|| "result line has neither response nor error".to_string())?;
    if !(200..300).contains(&response.status_code) {
        return Err(format!(
            "request failed ({}): {}",
            response.status_code,
            error_message(&response.body)
        ));
    }
    let ocr: OcrResponse = serde_json::from_value(response.body)
        .map_err(|e| format!("malformed OCR response: {}", e))?;
    Ok(ocr.joined_markdown())
}

fn error_message(value: &serde_json::Value) -> String {
    value
        .get("message")
        .or_else(|| value.get("detail"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

#[cfg(test)]
pub(crate) fn output_line(custom_id: &str, markdown: &str) -> String {
    serde_json::json!({
        "id": format!("req-{}", custom_id),
        "custom_id": custom_id,
        "response": {
            "status_code": 200,
            "body": { "pages": [{ "index": 0, "markdown": markdown }], "model": "mistral-ocr-latest" }
        },
        "error": null
    })
    .to_string()
}
