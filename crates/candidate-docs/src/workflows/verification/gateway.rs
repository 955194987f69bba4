use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{ActorCredential, AuthenticatedActor, CandidateId, Document, DocumentId};
use super::upload::UploadFile;

/// Operations consumed from the verification pipeline and its storage layer.
#[async_trait]
pub trait VerificationGateway: Send + Sync {
    /// Store a file for a candidate. The returned document starts in `pending_ai`.
    async fn upload_document(
        &self,
        file: &UploadFile,
        candidate_id: &CandidateId,
    ) -> Result<Document, GatewayError>;

    /// Idempotent, side-effect-free status read.
    async fn document_status(&self, document_id: &DocumentId) -> Result<Document, GatewayError>;

    async fn trigger_extraction(
        &self,
        candidate_id: &CandidateId,
        storage_ref: &str,
    ) -> Result<ExtractionResult, GatewayError>;

    /// Resubmit a document; on acceptance it re-enters `pending_ai` remotely.
    async fn reprocess_document(&self, document_id: &DocumentId)
        -> Result<ReprocessAck, GatewayError>;

    async fn override_document(
        &self,
        document_id: &DocumentId,
        credential: &ActorCredential,
        justification: &str,
    ) -> Result<Document, GatewayError>;
}

/// Re-authenticates an acting identity independently of any session it already holds.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn reauthenticate(
        &self,
        credential: &ActorCredential,
    ) -> Result<AuthenticatedActor, GatewayError>;
}

/// Outcome of the extraction trigger, mirroring the `{success, data}` / `{success: false,
/// error}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExtractionResult {
    Extracted { data: serde_json::Value },
    Rejected { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReprocessAck {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Transport or remote failure. Always retryable by the caller, never swallowed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),
    #[error("pipeline responded {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("credentials rejected: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unreadable pipeline response: {0}")]
    Decode(String),
    /// Refused locally before anything was sent.
    #[error("invalid pipeline request: {0}")]
    InvalidRequest(String),
    #[error("{operation} timed out after {}s", after.as_secs())]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },
}

impl GatewayError {
    /// Original remote text when the pipeline supplied one.
    pub fn remote_text(&self) -> Option<&str> {
        match self {
            GatewayError::Remote { body, .. } if !body.trim().is_empty() => Some(body.as_str()),
            GatewayError::Unauthorized(body) | GatewayError::NotFound(body)
                if !body.trim().is_empty() =>
            {
                Some(body.as_str())
            }
            _ => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            GatewayError::Remote { status, .. } => Some(*status),
            GatewayError::Unauthorized(_) => Some(401),
            GatewayError::NotFound(_) => Some(404),
            _ => None,
        }
    }
}
