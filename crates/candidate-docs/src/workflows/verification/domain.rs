use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::RejectionCode;

/// Opaque identifier assigned by the verification pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the candidate a document was submitted for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub String);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category assigned by the external classifier. Never edited locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentCategory {
    #[serde(rename = "CV", alias = "cv_resume")]
    Cv,
    #[serde(alias = "passport")]
    Passport,
    #[serde(alias = "certificates")]
    Certificate,
    #[serde(alias = "contracts")]
    Contract,
    #[serde(alias = "medical_reports")]
    Medical,
    #[serde(alias = "photos")]
    Photo,
    #[serde(alias = "other")]
    Other,
}

impl DocumentCategory {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cv => "CV/Resume",
            Self::Passport => "Passport",
            Self::Certificate => "Certificate",
            Self::Contract => "Contract",
            Self::Medical => "Medical Report",
            Self::Photo => "Photo",
            Self::Other => "Other",
        }
    }
}

/// Verification status reported by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    PendingAi,
    Verified,
    NeedsReview,
    RejectedMismatch,
    Failed,
}

impl VerificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::PendingAi => "pending_ai",
            Self::Verified => "verified",
            Self::NeedsReview => "needs_review",
            Self::RejectedMismatch => "rejected_mismatch",
            Self::Failed => "failed",
        }
    }

    /// Statuses that may carry a rejection payload and can be left through retry or override.
    pub const fn is_soft_terminal(self) -> bool {
        matches!(self, Self::NeedsReview | Self::RejectedMismatch | Self::Failed)
    }

    pub const fn is_pending(self) -> bool {
        matches!(self, Self::PendingAi)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a document reached the verified state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationSource {
    AiVerification,
    AdminOverride,
    ManualReview,
}

/// Pipeline stage that produced a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorStage {
    #[serde(rename = "OCR")]
    Ocr,
    #[serde(alias = "VISION")]
    Vision,
    #[serde(alias = "MATCHING")]
    Matching,
    #[serde(alias = "EXTRACTION")]
    Extraction,
    #[serde(alias = "CATEGORIZATION")]
    Categorization,
}

/// Application roles, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Staff,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Who overrode a rejection, when, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideStamp {
    pub by: String,
    pub at: DateTime<Utc>,
    pub reason: String,
}

pub const DEFAULT_MAX_RETRIES: u32 = 2;

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_required_role() -> Role {
    Role::Admin
}

/// Rejection details attached to soft-terminal documents.
///
/// The block is kept after an override so the prior code and the override stamp stay visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub code: RejectionCode,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub mismatch_fields: BTreeSet<String>,
    #[serde(default)]
    pub ai_confidence: Option<f64>,
    #[serde(default)]
    pub ocr_confidence: Option<f64>,
    #[serde(default)]
    pub error_stage: Option<ErrorStage>,
    #[serde(default)]
    pub retry_possible: bool,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub is_overridable: bool,
    #[serde(default = "default_required_role")]
    pub required_role: Role,
    #[serde(default)]
    pub overridden: Option<OverrideStamp>,
}

impl Rejection {
    pub fn new(code: RejectionCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            mismatch_fields: BTreeSet::new(),
            ai_confidence: None,
            ocr_confidence: None,
            error_stage: None,
            retry_possible: false,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            is_overridable: false,
            required_role: Role::Admin,
            overridden: None,
        }
    }

    pub fn retries_remaining(&self) -> u32 {
        self.max_retries.saturating_sub(self.retry_count)
    }
}

/// Client-side view of a pipeline document, always taken from a confirmed fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub candidate_id: CandidateId,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub storage_ref: Option<String>,
    #[serde(default)]
    pub category: Option<DocumentCategory>,
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub verification_source: Option<VerificationSource>,
    #[serde(default)]
    pub rejection: Option<Rejection>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub extraction_confidence: BTreeMap<String, f64>,
}

impl Document {
    pub fn is_overridden(&self) -> bool {
        self.verification_source == Some(VerificationSource::AdminOverride)
    }

    pub fn rejection_code(&self) -> Option<&RejectionCode> {
        self.rejection.as_ref().map(|rejection| &rejection.code)
    }
}

/// Credential supplied for re-authentication; never logged or serialized back out.
#[derive(Clone, Deserialize)]
pub struct ActorCredential {
    pub email: String,
    pub password: String,
}

impl ActorCredential {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.email.trim().is_empty() || self.password.is_empty()
    }
}

impl fmt::Debug for ActorCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorCredential")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Identity confirmed by re-authentication, independent of any existing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedActor {
    pub identity: String,
    pub role: Role,
}

/// Inbound override request. Lives only for the duration of the call.
#[derive(Debug, Clone)]
pub struct OverrideRequest {
    pub document_id: DocumentId,
    pub credential: ActorCredential,
    pub justification: String,
}
