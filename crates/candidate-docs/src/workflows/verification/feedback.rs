//! Friendly, categorized failure messages that keep the original remote text alongside.

use std::time::Duration;

use serde::Serialize;

use super::gateway::GatewayError;
use super::upload::UploadRejection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    SizeLimit,
    UnsupportedType,
    Network,
    Timeout,
    NotFound,
    Authorization,
    Server,
    Unknown,
}

impl FailureCategory {
    pub const fn message(self) -> &'static str {
        match self {
            Self::SizeLimit => "File is too large. Maximum size is 10MB.",
            Self::UnsupportedType => {
                "Unsupported file type. Please upload PDF, DOC, DOCX, JPG, PNG, or TXT files."
            }
            Self::Network => "Network error. Please check your connection and try again.",
            Self::Timeout => "The operation timed out; its outcome is unknown.",
            Self::NotFound => "The document could not be found.",
            Self::Authorization => "You are not authorized to perform this action.",
            Self::Server => "The verification service reported an error.",
            Self::Unknown => "Something went wrong.",
        }
    }
}

/// A failure ready for display: a categorized message plus the original detail, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFacingError {
    pub category: FailureCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl UserFacingError {
    pub fn new(category: FailureCategory, detail: Option<String>) -> Self {
        Self {
            category,
            message: category.message().to_string(),
            detail,
        }
    }

    pub fn timed_out(operation: &str, after: Duration) -> Self {
        Self::new(
            FailureCategory::Timeout,
            Some(format!(
                "{operation} did not finish within {}s",
                after.as_secs()
            )),
        )
    }
}

pub fn categorize(error: &GatewayError) -> FailureCategory {
    match error {
        GatewayError::Network(_) => FailureCategory::Network,
        GatewayError::TimedOut { .. } => FailureCategory::Timeout,
        GatewayError::NotFound(_) | GatewayError::InvalidRequest(_) => FailureCategory::NotFound,
        GatewayError::Unauthorized(_) => FailureCategory::Authorization,
        GatewayError::Remote { status: 413, .. } => FailureCategory::SizeLimit,
        GatewayError::Remote { status: 415, .. } => FailureCategory::UnsupportedType,
        GatewayError::Remote { status: 403, .. } => FailureCategory::Authorization,
        GatewayError::Remote { body, .. } => categorize_text(body),
        GatewayError::Decode(_) => FailureCategory::Server,
    }
}

fn categorize_text(body: &str) -> FailureCategory {
    let lowered = body.to_ascii_lowercase();
    if lowered.contains("too large") || lowered.contains("size limit") {
        FailureCategory::SizeLimit
    } else if lowered.contains("unsupported") || lowered.contains("file type") {
        FailureCategory::UnsupportedType
    } else {
        FailureCategory::Server
    }
}

impl From<&GatewayError> for UserFacingError {
    fn from(error: &GatewayError) -> Self {
        let detail = error
            .remote_text()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        UserFacingError::new(categorize(error), Some(detail))
    }
}

impl From<&UploadRejection> for UserFacingError {
    fn from(rejection: &UploadRejection) -> Self {
        let category = match rejection {
            UploadRejection::TooLarge { .. } => FailureCategory::SizeLimit,
            UploadRejection::UnsupportedType { .. } => FailureCategory::UnsupportedType,
            UploadRejection::Empty { .. } => FailureCategory::Unknown,
        };
        UserFacingError::new(category, Some(rejection.to_string()))
    }
}
