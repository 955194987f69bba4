use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::audit::{AuditError, AuditRecorder};
use super::authorization::DenialRemedy;
use super::domain::{ActorCredential, CandidateId, DocumentId, OverrideRequest};
use super::gateway::{GatewayError, IdentityVerifier, VerificationGateway};
use super::service::{DocumentVerificationService, VerificationError};

type SharedService<G, V, A> = Arc<DocumentVerificationService<G, V, A>>;

/// Router exposing document status, retry, override, and audit endpoints.
pub fn verification_router<G, V, A>(service: SharedService<G, V, A>) -> Router
where
    G: VerificationGateway + 'static,
    V: IdentityVerifier + 'static,
    A: AuditRecorder + 'static,
{
    Router::new()
        .route(
            "/api/v1/documents/:document_id",
            get(status_handler::<G, V, A>),
        )
        .route(
            "/api/v1/documents/:document_id/refresh",
            post(refresh_handler::<G, V, A>),
        )
        .route(
            "/api/v1/documents/:document_id/retry",
            post(retry_handler::<G, V, A>),
        )
        .route(
            "/api/v1/documents/:document_id/override",
            post(override_handler::<G, V, A>),
        )
        .route(
            "/api/v1/documents/:document_id/audit",
            get(audit_handler::<G, V, A>),
        )
        .route(
            "/api/v1/candidates/:candidate_id/health",
            get(health_handler::<G, V, A>),
        )
        .with_state(service)
}

/// Inbound override payload.
#[derive(Debug, Deserialize)]
pub struct OverridePayload {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub justification: String,
}

pub(crate) async fn status_handler<G, V, A>(
    State(service): State<SharedService<G, V, A>>,
    Path(document_id): Path<String>,
) -> Response
where
    G: VerificationGateway + 'static,
    V: IdentityVerifier + 'static,
    A: AuditRecorder + 'static,
{
    let id = DocumentId(document_id);
    match service.status_view(&id, Utc::now().date_naive()).await {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn refresh_handler<G, V, A>(
    State(service): State<SharedService<G, V, A>>,
    Path(document_id): Path<String>,
) -> Response
where
    G: VerificationGateway + 'static,
    V: IdentityVerifier + 'static,
    A: AuditRecorder + 'static,
{
    let id = DocumentId(document_id);
    if let Err(error) = service.refresh(&id).await {
        return error_response(&error);
    }
    match service.status_view(&id, Utc::now().date_naive()).await {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn retry_handler<G, V, A>(
    State(service): State<SharedService<G, V, A>>,
    Path(document_id): Path<String>,
) -> Response
where
    G: VerificationGateway + 'static,
    V: IdentityVerifier + 'static,
    A: AuditRecorder + 'static,
{
    let id = DocumentId(document_id);
    match service.retry(&id).await {
        Ok(tracked) => {
            let payload = json!({
                "document_id": tracked.document.id,
                "status": tracked.document.verification_status.label(),
                "awaiting_confirmation": tracked.optimistic,
            });
            (StatusCode::ACCEPTED, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn override_handler<G, V, A>(
    State(service): State<SharedService<G, V, A>>,
    Path(document_id): Path<String>,
    axum::Json(payload): axum::Json<OverridePayload>,
) -> Response
where
    G: VerificationGateway + 'static,
    V: IdentityVerifier + 'static,
    A: AuditRecorder + 'static,
{
    let request = OverrideRequest {
        document_id: DocumentId(document_id),
        credential: ActorCredential::new(payload.email, payload.password),
        justification: payload.justification,
    };
    match service.request_override(request).await {
        Ok(receipt) => {
            let payload = json!({
                "document_id": receipt.document.document.id,
                "status": receipt.document.document.verification_status.label(),
                "verification_source": receipt.document.document.verification_source,
                "audit": receipt.audit,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn audit_handler<G, V, A>(
    State(service): State<SharedService<G, V, A>>,
    Path(document_id): Path<String>,
) -> Response
where
    G: VerificationGateway + 'static,
    V: IdentityVerifier + 'static,
    A: AuditRecorder + 'static,
{
    let id = DocumentId(document_id);
    let entries = service.audit_trail(&id);
    let payload = json!({
        "document_id": id,
        "entries": entries,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn health_handler<G, V, A>(
    State(service): State<SharedService<G, V, A>>,
    Path(candidate_id): Path<String>,
) -> Response
where
    G: VerificationGateway + 'static,
    V: IdentityVerifier + 'static,
    A: AuditRecorder + 'static,
{
    let health = service.health(&CandidateId(candidate_id));
    (StatusCode::OK, axum::Json(health)).into_response()
}

/// HTTP status for a service error.
pub fn status_for(error: &VerificationError) -> StatusCode {
    match error {
        VerificationError::OverrideDenied(_)
        | VerificationError::UploadRejected(_)
        | VerificationError::Transport(GatewayError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
        VerificationError::RetryRefused(_)
        | VerificationError::Audit(AuditError::OverrideInFlight(_)) => StatusCode::CONFLICT,
        VerificationError::Transport(GatewayError::NotFound(_)) => StatusCode::NOT_FOUND,
        VerificationError::Transport(_) | VerificationError::UnconfirmedOverride { .. } => {
            StatusCode::BAD_GATEWAY
        }
        VerificationError::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
        VerificationError::Audit(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(error: &VerificationError) -> Response {
    let facing = error.user_facing();
    let remedy = match error {
        VerificationError::OverrideDenied(denial) => denial.remedy(),
        _ => DenialRemedy::None,
    };
    let payload = json!({
        "error": error.to_string(),
        "category": facing.category,
        "message": facing.message,
        "detail": facing.detail,
        "remedy": remedy,
    });
    (status_for(error), axum::Json(payload)).into_response()
}
