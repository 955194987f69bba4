//! Known rejection codes, their human descriptions, and the per-candidate health roll-up.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::{Document, VerificationStatus};

/// Rejection code reported by the pipeline. Unrecognised codes are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RejectionCode {
    CnicMismatch,
    PassportMismatch,
    DobMismatch,
    NameMismatch,
    EmailMismatch,
    PhoneMismatch,
    FatherNameMismatch,
    ExpiredPassport,
    ExpiredMedical,
    ExpiredCertificate,
    ExpiredDocument,
    LowOcrConfidence,
    LowAiConfidence,
    LowConfidence,
    DocumentTampered,
    PhotoMismatch,
    OcrFailed,
    VisionFailed,
    MatchingFailed,
    ExtractionFailed,
    CategorizationFailed,
    NoIdFound,
    CnicBelongsToAnother,
    PassportBelongsToAnother,
    Other(String),
}

static KNOWN_CODES: [(&str, RejectionCode); 24] = [
    ("CNIC_MISMATCH", RejectionCode::CnicMismatch),
    ("PASSPORT_MISMATCH", RejectionCode::PassportMismatch),
    ("DOB_MISMATCH", RejectionCode::DobMismatch),
    ("NAME_MISMATCH", RejectionCode::NameMismatch),
    ("EMAIL_MISMATCH", RejectionCode::EmailMismatch),
    ("PHONE_MISMATCH", RejectionCode::PhoneMismatch),
    ("FATHER_NAME_MISMATCH", RejectionCode::FatherNameMismatch),
    ("EXPIRED_PASSPORT", RejectionCode::ExpiredPassport),
    ("EXPIRED_MEDICAL", RejectionCode::ExpiredMedical),
    ("EXPIRED_CERTIFICATE", RejectionCode::ExpiredCertificate),
    ("EXPIRED_DOCUMENT", RejectionCode::ExpiredDocument),
    ("LOW_OCR_CONFIDENCE", RejectionCode::LowOcrConfidence),
    ("LOW_AI_CONFIDENCE", RejectionCode::LowAiConfidence),
    ("LOW_CONFIDENCE", RejectionCode::LowConfidence),
    ("DOCUMENT_TAMPERED", RejectionCode::DocumentTampered),
    ("PHOTO_MISMATCH", RejectionCode::PhotoMismatch),
    ("OCR_FAILED", RejectionCode::OcrFailed),
    ("VISION_FAILED", RejectionCode::VisionFailed),
    ("MATCHING_FAILED", RejectionCode::MatchingFailed),
    ("EXTRACTION_FAILED", RejectionCode::ExtractionFailed),
    ("CATEGORIZATION_FAILED", RejectionCode::CategorizationFailed),
    ("NO_ID_FOUND", RejectionCode::NoIdFound),
    ("CNIC_BELONGS_TO_ANOTHER", RejectionCode::CnicBelongsToAnother),
    (
        "PASSPORT_BELONGS_TO_ANOTHER",
        RejectionCode::PassportBelongsToAnother,
    ),
];

impl RejectionCode {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_uppercase();
        KNOWN_CODES
            .iter()
            .find(|(wire, _)| *wire == normalized)
            .map(|(_, code)| code.clone())
            .unwrap_or(Self::Other(normalized))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Other(raw) => raw.as_str(),
            known => KNOWN_CODES
                .iter()
                .find(|(_, code)| code == known)
                .map(|(wire, _)| *wire)
                .unwrap_or("UNKNOWN"),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::ExpiredPassport
            | Self::ExpiredMedical
            | Self::ExpiredCertificate
            | Self::ExpiredDocument
            | Self::DocumentTampered
            | Self::PhotoMismatch
            | Self::CnicBelongsToAnother
            | Self::PassportBelongsToAnother => Severity::Critical,
            Self::CnicMismatch
            | Self::PassportMismatch
            | Self::DobMismatch
            | Self::NameMismatch
            | Self::EmailMismatch
            | Self::PhoneMismatch
            | Self::FatherNameMismatch
            | Self::LowOcrConfidence
            | Self::OcrFailed
            | Self::VisionFailed
            | Self::MatchingFailed
            | Self::ExtractionFailed
            | Self::CategorizationFailed => Severity::Warning,
            Self::LowAiConfidence | Self::LowConfidence | Self::NoIdFound | Self::Other(_) => {
                Severity::Info
            }
        }
    }

    pub fn description(&self) -> String {
        let text = match self {
            Self::CnicMismatch => "CNIC details don't match candidate information.",
            Self::PassportMismatch => "Passport details don't match candidate information.",
            Self::DobMismatch => "Date of birth doesn't match candidate records.",
            Self::NameMismatch => "Name doesn't match candidate information.",
            Self::EmailMismatch => "Email address doesn't match candidate information.",
            Self::PhoneMismatch => "Phone number doesn't match candidate information.",
            Self::FatherNameMismatch => "Father's name doesn't match candidate information.",
            Self::ExpiredPassport => "Passport has expired. Please update with valid document.",
            Self::ExpiredMedical => "Medical certificate has expired. Requires renewal.",
            Self::ExpiredCertificate => {
                "Certificate has expired. Please provide updated document."
            }
            Self::ExpiredDocument => "This document has expired.",
            Self::LowOcrConfidence => "Document quality is poor. OCR reading may be inaccurate.",
            Self::LowAiConfidence => {
                "The AI could not confidently categorize or extract information from this document."
            }
            Self::LowConfidence => "Document needs manual review for verification.",
            Self::DocumentTampered => "Document appears to be tampered or forged.",
            Self::PhotoMismatch => "Photo does not match candidate profile.",
            Self::OcrFailed => "Failed to extract text from the document using OCR.",
            Self::VisionFailed => "Failed to process the document image using AI vision.",
            Self::MatchingFailed => "Failed to match this document with the candidate.",
            Self::ExtractionFailed => "Failed to extract required information from the document.",
            Self::CategorizationFailed => "Failed to categorize this document type.",
            Self::NoIdFound => "No identity information could be found in this document.",
            Self::CnicBelongsToAnother => {
                "This CNIC number belongs to another candidate in the system."
            }
            Self::PassportBelongsToAnother => {
                "This passport number belongs to another candidate in the system."
            }
            Self::Other(raw) => {
                return format!(
                    "Document rejected: {}",
                    raw.replace('_', " ").to_ascii_lowercase()
                )
            }
        };
        text.to_string()
    }
}

impl From<String> for RejectionCode {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for RejectionCode {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<RejectionCode> for String {
    fn from(value: RejectionCode) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Render the disagreeing candidate attributes for display.
pub fn format_mismatch_fields<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let fields: Vec<&str> = fields.into_iter().map(String::as_str).collect();
    if fields.is_empty() {
        "Verification mismatch".to_string()
    } else {
        format!("Mismatch in: {}", fields.join(", "))
    }
}

/// Overall verification picture across a candidate's documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Verified,
    Rejected,
    NeedsReview,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallSeverity {
    Healthy,
    Info,
    Warning,
    Critical,
}

/// One problem document in a health summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentIssue {
    pub document_id: String,
    pub code: String,
    pub severity: Severity,
    pub description: String,
    pub mismatch: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentHealth {
    pub status: HealthStatus,
    pub total_documents: usize,
    pub verified: usize,
    pub rejected: usize,
    pub needs_review: usize,
    pub overall_severity: OverallSeverity,
    pub issues: Vec<DocumentIssue>,
}

impl DocumentHealth {
    pub fn summarize<'a, I>(documents: I) -> Self
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut health = Self {
            status: HealthStatus::Processing,
            total_documents: 0,
            verified: 0,
            rejected: 0,
            needs_review: 0,
            overall_severity: OverallSeverity::Healthy,
            issues: Vec::new(),
        };

        for document in documents {
            health.total_documents += 1;
            match document.verification_status {
                VerificationStatus::Verified => health.verified += 1,
                VerificationStatus::RejectedMismatch | VerificationStatus::Failed => {
                    health.rejected += 1
                }
                VerificationStatus::NeedsReview | VerificationStatus::PendingAi => {
                    health.needs_review += 1
                }
            }

            if document.verification_status == VerificationStatus::Verified {
                continue;
            }
            if let Some(rejection) = &document.rejection {
                health.issues.push(DocumentIssue {
                    document_id: document.id.0.clone(),
                    code: rejection.code.to_string(),
                    severity: rejection.code.severity(),
                    description: rejection.code.description(),
                    mismatch: format_mismatch_fields(&rejection.mismatch_fields),
                });
            }
        }

        health.overall_severity = match health.issues.iter().map(|issue| issue.severity).max() {
            Some(Severity::Critical) => OverallSeverity::Critical,
            Some(Severity::Warning) => OverallSeverity::Warning,
            Some(Severity::Info) => OverallSeverity::Info,
            None => OverallSeverity::Healthy,
        };

        health.status = if health.rejected > 0 {
            HealthStatus::Rejected
        } else if health.needs_review > 0 {
            HealthStatus::NeedsReview
        } else if health.total_documents > 0 {
            HealthStatus::Verified
        } else {
            HealthStatus::Processing
        };

        health
    }
}
