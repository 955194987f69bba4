use mime::Mime;

/// Largest file accepted for upload.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const DOC_TYPE: &str = "application/msword";
const DOCX_TYPE: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// A file waiting to be sent to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Mime,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, content_type: Mime, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Local checks run before any network call.
    pub fn validate(&self) -> Result<(), UploadRejection> {
        if self.bytes.is_empty() {
            return Err(UploadRejection::Empty {
                file_name: self.file_name.clone(),
            });
        }
        if self.bytes.len() > MAX_UPLOAD_BYTES {
            return Err(UploadRejection::TooLarge {
                file_name: self.file_name.clone(),
                size: self.bytes.len(),
                limit: MAX_UPLOAD_BYTES,
            });
        }
        if !is_supported(&self.content_type) {
            return Err(UploadRejection::UnsupportedType {
                file_name: self.file_name.clone(),
                content_type: self.content_type.essence_str().to_string(),
            });
        }
        Ok(())
    }
}

pub fn is_supported(content_type: &Mime) -> bool {
    let essence = content_type.essence_str();
    essence == mime::APPLICATION_PDF.essence_str()
        || essence == mime::IMAGE_JPEG.essence_str()
        || essence == mime::IMAGE_PNG.essence_str()
        || essence == mime::TEXT_PLAIN.essence_str()
        || essence == DOC_TYPE
        || essence == DOCX_TYPE
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
    #[error("{file_name} is {size} bytes; the limit is {limit}")]
    TooLarge {
        file_name: String,
        size: usize,
        limit: usize,
    },
    #[error("{file_name} has unsupported type {content_type}")]
    UnsupportedType {
        file_name: String,
        content_type: String,
    },
    #[error("{file_name} is empty")]
    Empty { file_name: String },
}

impl UploadRejection {
    pub fn file_name(&self) -> &str {
        match self {
            UploadRejection::TooLarge { file_name, .. }
            | UploadRejection::UnsupportedType { file_name, .. }
            | UploadRejection::Empty { file_name } => file_name,
        }
    }
}
