//! Uploaded documents: extension checks and `data:` URL encoding.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;
use std::path::Path;

use crate::error::{OcrError, OcrResult};

/// Extensions accepted by the single-file flow.
pub const SINGLE_ALLOWED: &str = "pdf, png, jpg, jpeg";
/// Extensions accepted by the batch flow (images only).
pub const BATCH_ALLOWED: &str = "png, jpg, jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Png,
    Jpeg,
}

impl DocumentKind {
    /// Detect the kind from a file name's extension (case-insensitive).
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    pub fn is_image(self) -> bool {
        !matches!(self, Self::Pdf)
    }
}

/// A file received from the browser, held in memory for one request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub kind: DocumentKind,
    pub data: Vec<u8>,
}

impl UploadedFile {
    /// Accept a PDF or image for the single-file flow.
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> OcrResult<Self> {
        let file_name = file_name.into();
        let kind = DocumentKind::from_file_name(&file_name).ok_or_else(|| {
            OcrError::UnsupportedFileType {
                file_name: file_name.clone(),
                allowed: SINGLE_ALLOWED,
            }
        })?;
        if data.is_empty() {
            return Err(OcrError::EmptyFile(file_name));
        }
        Ok(Self {
            file_name,
            kind,
            data,
        })
    }

    /// Accept an image for the batch flow; PDFs are rejected.
    pub fn new_image(file_name: impl Into<String>, data: Vec<u8>) -> OcrResult<Self> {
        let file = Self::new(file_name, data)?;
        if !file.kind.is_image() {
            return Err(OcrError::UnsupportedFileType {
                file_name: file.file_name,
                allowed: BATCH_ALLOWED,
            });
        }
        Ok(file)
    }

    /// File name without its extension, used as the name on the provider side.
    pub fn stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
    }

    pub fn data_url(&self) -> String {
        data_url(self.kind.mime_type(), &self.data)
    }
}

/// Convert binary data to a `data:` URL.
pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, BASE64.encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_detection() {
        assert_eq!(DocumentKind::from_file_name("scan.PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_file_name("a.b.png"), Some(DocumentKind::Png));
        assert_eq!(DocumentKind::from_file_name("photo.JPG"), Some(DocumentKind::Jpeg));
        assert_eq!(DocumentKind::from_file_name("photo.jpeg"), Some(DocumentKind::Jpeg));
        assert_eq!(DocumentKind::from_file_name("notes.txt"), None);
        assert_eq!(DocumentKind::from_file_name("README"), None);
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let err = UploadedFile::new("sheet.xlsx", b"data".to_vec()).unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedFileType { allowed: SINGLE_ALLOWED, .. }));
    }

    #[test]
    fn test_empty_file_rejected() {
        let err = UploadedFile::new("scan.pdf", Vec::new()).unwrap_err();
        assert!(matches!(err, OcrError::EmptyFile(name) if name == "scan.pdf"));
    }

    #[test]
    fn test_batch_rejects_pdf() {
        let err = UploadedFile::new_image("scan.pdf", b"%PDF".to_vec()).unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedFileType { allowed: BATCH_ALLOWED, .. }));
        assert!(UploadedFile::new_image("page.png", vec![1, 2, 3]).is_ok());
    }

    #[test]
    fn test_stem_and_data_url() {
        let file = UploadedFile::new("receipt.final.jpg", b"hi".to_vec()).unwrap();
        assert_eq!(file.stem(), "receipt.final");
        assert_eq!(file.data_url(), "data:image/jpeg;base64,aGk=");
    }
}
