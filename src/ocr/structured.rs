//! Structured annotation of image OCR output.
//!
//! A vision chat model reads the image plus its OCR markdown and returns JSON
//! matching [`StructuredOcr`]; topics and languages become the result's
//! metadata.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredOcr {
    pub file_name: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub ocr_contents: serde_json::Value,
}

pub const SCHEMA_NAME: &str = "structured_ocr";

/// Prompt wrapping the OCR markdown for the annotation model.
pub fn annotation_prompt(markdown: &str) -> String {
    format!(
        "This is the image's OCR in markdown:\n<BEGIN_IMAGE_OCR>\n{}\n<END_IMAGE_OCR>.\n\
         Convert this into a structured JSON response with the OCR contents in a sensible dictionary.",
        markdown
    )
}

/// JSON schema handed to the chat endpoint's `response_format`.
pub fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "file_name": { "type": "string" },
            "topics": { "type": "array", "items": { "type": "string" } },
            "languages": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Full English names of the languages present, e.g. \"French\""
            },
            "ocr_contents": { "type": "object" }
        },
        "required": ["file_name", "topics", "languages", "ocr_contents"],
        "additionalProperties": false
    })
}
