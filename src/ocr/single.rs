//! Single-file OCR: one upload, one synchronous OCR call.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::{FilePurpose, OcrApi, OcrDocument, StructuredOcr};
use crate::document::{DocumentKind, UploadedFile};
use crate::error::{OcrError, OcrResult};

/// Signed URLs for uploaded PDFs only need to outlive the OCR call.
const SIGNED_URL_EXPIRY_HOURS: u32 = 1;

/// Text extracted from one uploaded file.
#[derive(Debug, Clone, Serialize)]
pub struct OcrOutput {
    pub id: Uuid,
    pub file_name: String,
    pub kind: DocumentKind,
    pub page_count: usize,
    pub model: Option<String>,
    /// Markdown shown in the UI and served verbatim by the download endpoint.
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<StructuredOcr>,
}

/// Run OCR on one file. `structured` only applies to images.
pub async fn process_file(
    api: &dyn OcrApi,
    file: &UploadedFile,
    structured: bool,
) -> OcrResult<OcrOutput> {
    let (response, image_url) = match file.kind {
        DocumentKind::Pdf => {
            info!("Processing PDF {} ({} bytes)", file.file_name, file.data.len());
            let file_id = api
                .upload_file(
                    file.stem(),
                    file.kind.mime_type(),
                    file.data.clone(),
                    FilePurpose::Ocr,
                )
                .await?;
            let document_url = api.signed_url(&file_id, SIGNED_URL_EXPIRY_HOURS).await?;
            let response = api.ocr(OcrDocument::DocumentUrl { document_url }).await?;
            (response, None)
        }
        DocumentKind::Png | DocumentKind::Jpeg => {
            info!("Processing image {} ({} bytes)", file.file_name, file.data.len());
            let image_url = file.data_url();
            let response = api
                .ocr(OcrDocument::ImageUrl {
                    image_url: image_url.clone(),
                })
                .await?;
            (response, Some(image_url))
        }
    };

    if response.pages.is_empty() {
        return Err(OcrError::NoText(file.file_name.clone()));
    }
    let text = response.joined_markdown();

    let structured = match image_url {
        Some(image_url) if structured => {
            let mut parsed = api.annotate(&image_url, &text).await?;
            parsed.file_name = file.file_name.clone();
            Some(parsed)
        }
        _ => None,
    };

    info!(
        "OCR complete for {}: {} pages, {} chars",
        file.file_name,
        response.pages.len(),
        text.len()
    );

    Ok(OcrOutput {
        id: Uuid::new_v4(),
        file_name: file.file_name.clone(),
        kind: file.kind,
        page_count: response.pages.len(),
        model: response.model,
        text,
        structured,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::fake::FakeOcrApi;

    #[tokio::test]
    async fn test_pdf_goes_through_file_store() {
        let api = FakeOcrApi::new().with_pages(&["# Title", "Second page"]);
        let file = UploadedFile::new("contract.pdf", b"%PDF-1.7".to_vec()).unwrap();

        let output = process_file(&api, &file, false).await.unwrap();

        assert_eq!(output.text, "# Title\n\nSecond page");
        assert_eq!(output.page_count, 2);
        assert_eq!(api.calls(), vec!["upload:ocr", "signed_url", "ocr:document_url"]);
        assert_eq!(api.uploads()[0].0, "contract");
    }

    #[tokio::test]
    async fn test_image_text_returned_verbatim() {
        let api = FakeOcrApi::new().with_pages(&["Total: **12.00** EUR\n| a | b |"]);
        let file = UploadedFile::new("receipt.png", vec![0x89, 0x50]).unwrap();

        let output = process_file(&api, &file, false).await.unwrap();

        assert_eq!(output.text, "Total: **12.00** EUR\n| a | b |");
        assert!(output.structured.is_none());
        assert_eq!(api.calls(), vec!["ocr:image_url"]);
    }

    #[tokio::test]
    async fn test_structured_annotation_uses_upload_name() {
        let api = FakeOcrApi::new().with_pages(&["Bonjour"]);
        let file = UploadedFile::new("menu.jpg", vec![0xff, 0xd8]).unwrap();

        let output = process_file(&api, &file, true).await.unwrap();

        let structured = output.structured.unwrap();
        assert_eq!(structured.file_name, "menu.jpg");
        assert_eq!(structured.ocr_contents["text"], "Bonjour");
        assert_eq!(api.calls(), vec!["ocr:image_url", "annotate"]);
    }

    #[tokio::test]
    async fn test_structured_ignored_for_pdf() {
        let api = FakeOcrApi::new().with_pages(&["text"]);
        let file = UploadedFile::new("a.pdf", vec![1]).unwrap();

        let output = process_file(&api, &file, true).await.unwrap();
        assert!(output.structured.is_none());
        assert!(!api.calls().contains(&"annotate".to_string()));
    }

    #[tokio::test]
    async fn test_no_pages_is_no_text() {
        let api = FakeOcrApi::new();
        let file = UploadedFile::new("blank.png", vec![1]).unwrap();

        let err = process_file(&api, &file, false).await.unwrap_err();
        assert!(matches!(err, OcrError::NoText(name) if name == "blank.png"));
    }
}
