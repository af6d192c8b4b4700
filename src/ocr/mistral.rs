//! Mistral API client (files, OCR, chat and batch endpoints).

use super::structured::{self, StructuredOcr};
use super::{FilePurpose, OcrApi, OcrDocument, OcrResponse};
use crate::batch::{BatchJob, OCR_ENDPOINT};
use crate::config::AppConfig;
use crate::error::{OcrError, OcrResult};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Clone)]
pub struct MistralClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    ocr_model: String,
    structured_model: String,
}

impl MistralClient {
    /// Returns `None` when no API key is configured.
    pub fn from_config(client: reqwest::Client, config: &AppConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            client,
            api_key,
            base_url: config.api_url.clone(),
            ocr_model: config.ocr_model.clone(),
            structured_model: config.structured_model.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-success status to an [`OcrError`], otherwise pass through.
    async fn check(resp: reqwest::Response) -> OcrResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(OcrError::from_status(status.as_u16(), body))
    }

    async fn json<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> OcrResult<T> {
        let raw = Self::check(resp).await?.text().await?;
        debug!(
            "MistralClient: response ({} bytes): {}",
            raw.len(),
            &raw[..floor_char_boundary(&raw, 500)]
        );
        Ok(serde_json::from_str(&raw)?)
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut end = s.len().min(max);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

// ── Mistral API request/response types ──────────────────────────────────────

#[derive(Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: OcrDocument,
    include_image_base64: bool,
}

#[derive(Deserialize)]
struct FileUploadResponse {
    id: String,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    url: String,
}

#[derive(Serialize)]
struct BatchJobRequest<'a> {
    input_files: Vec<&'a str>,
    model: &'a str,
    endpoint: &'a str,
    metadata: HashMap<String, String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: String },
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormat {
    JsonSchema { json_schema: JsonSchemaFormat },
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: &'static str,
    schema: serde_json::Value,
    strict: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrApi for MistralClient {
    async fn upload_file(
        &self,
        file_name: &str,
        mime_type: &str,
        data: Vec<u8>,
        purpose: FilePurpose,
    ) -> OcrResult<String> {
        info!(
            "MistralClient: uploading {} ({} bytes, purpose={})",
            file_name,
            data.len(),
            purpose.as_str()
        );

        let part = Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;
        let form = Form::new()
            .part("file", part)
            .text("purpose", purpose.as_str());

        let resp = self
            .client
            .post(self.url("/v1/files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let upload: FileUploadResponse = Self::json(resp).await?;
        info!("MistralClient: uploaded file_id={}", upload.id);
        Ok(upload.id)
    }

    async fn signed_url(&self, file_id: &str, expiry_hours: u32) -> OcrResult<String> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/files/{}/url", file_id)))
            .query(&[("expiry", expiry_hours)])
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let signed: SignedUrlResponse = Self::json(resp).await?;
        Ok(signed.url)
    }

    async fn download_file(&self, file_id: &str) -> OcrResult<Vec<u8>> {
        info!("MistralClient: downloading file {}", file_id);
        let resp = self
            .client
            .get(self.url(&format!("/v1/files/{}/content", file_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Ok(Self::check(resp).await?.bytes().await?.to_vec())
    }

    async fn ocr(&self, document: OcrDocument) -> OcrResult<OcrResponse> {
        info!("MistralClient: calling OCR API (model={})", self.ocr_model);
        let body = OcrRequest {
            model: &self.ocr_model,
            document,
            include_image_base64: false,
        };
        let resp = self
            .client
            .post(self.url(OCR_ENDPOINT))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        Self::json(resp).await
    }

    async fn annotate(&self, image_url: &str, markdown: &str) -> OcrResult<StructuredOcr> {
        info!(
            "MistralClient: structured annotation (model={})",
            self.structured_model
        );
        let body = ChatRequest {
            model: &self.structured_model,
            temperature: 0.0,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::ImageUrl {
                        image_url: image_url.to_string(),
                    },
                    ContentPart::Text {
                        text: structured::annotation_prompt(markdown),
                    },
                ],
            }],
            response_format: ResponseFormat::JsonSchema {
                json_schema: JsonSchemaFormat {
                    name: structured::SCHEMA_NAME,
                    schema: structured::response_schema(),
                    strict: true,
                },
            },
        };
        let resp = self
            .client
            .post(self.url("/v1/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let chat: ChatResponse = Self::json(resp).await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OcrError::Decode("chat response has no content".to_string()))?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn create_batch_job(
        &self,
        input_file_id: &str,
        metadata: HashMap<String, String>,
    ) -> OcrResult<BatchJob> {
        let body = BatchJobRequest {
            input_files: vec![input_file_id],
            model: &self.ocr_model,
            endpoint: OCR_ENDPOINT,
            metadata,
        };
        let resp = self
            .client
            .post(self.url("/v1/batch/jobs"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let job: BatchJob = Self::json(resp).await?;
        info!("MistralClient: created batch job {} ({})", job.id, job.status);
        Ok(job)
    }

    async fn get_batch_job(&self, job_id: &str) -> OcrResult<BatchJob> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/batch/jobs/{}", job_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::json(resp).await
    }

    async fn cancel_batch_job(&self, job_id: &str) -> OcrResult<BatchJob> {
        info!("MistralClient: cancelling batch job {}", job_id);
        let resp = self
            .client
            .post(self.url(&format!("/v1/batch/jobs/{}/cancel", job_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::json(resp).await
    }
}
