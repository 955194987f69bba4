//! Candidate document verification: lifecycle, status synchronization, retry, and the
//! admin-override gate with its audit trail.
//!
//! The pipeline owns every document. This module holds a read view of it and only records a
//! transition once a status fetch has confirmed it.

pub mod audit;
pub mod authorization;
pub mod catalog;
pub mod confidence;
pub mod domain;
pub mod feedback;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod retry;
pub mod router;
pub mod service;
pub mod sync;
pub mod upload;
pub mod views;

#[cfg(test)]
mod tests;

pub use audit::{
    append_csv, export_csv, AuditEntry, AuditError, AuditRecorder, AuditReservation, MemoryAuditLog,
    EXPORT_HEADER,
};
pub use authorization::{
    DenialRemedy, OverrideDenial, OverrideEligibility, OverrideGate, OverridePolicy,
};
pub use catalog::{DocumentHealth, HealthStatus, OverallSeverity, RejectionCode, Severity};
pub use domain::{
    ActorCredential, AuthenticatedActor, CandidateId, Document, DocumentCategory, DocumentId,
    ErrorStage, OverrideRequest, OverrideStamp, Rejection, Role, VerificationSource,
    VerificationStatus,
};
pub use feedback::{FailureCategory, UserFacingError};
pub use gateway::{
    ExtractionResult, GatewayError, IdentityVerifier, ReprocessAck, VerificationGateway,
};
pub use http::HttpVerificationGateway;
pub use lifecycle::{display_state, DisplayState, TransitionCause};
pub use retry::{RetryAssessment, RetryController, RetryRejection};
pub use router::verification_router;
pub use service::{DocumentVerificationService, OverrideReceipt, UploadOutcome, VerificationError};
pub use sync::{CategoryOutcome, SyncOutcome, SyncReport, SyncScope, Visibility};
pub use upload::{UploadFile, UploadRejection, MAX_UPLOAD_BYTES};
pub use views::{DocumentStatusView, TrackedDocument};
