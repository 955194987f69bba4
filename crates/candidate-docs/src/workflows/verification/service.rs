use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};

use super::audit::{export_csv, AuditEntry, AuditError, AuditRecorder};
use super::authorization::{GateFailure, OverrideDenial, OverrideEligibility, OverrideGate};
use super::catalog::DocumentHealth;
use super::domain::{
    CandidateId, Document, DocumentId, OverrideRequest, OverrideStamp, Rejection, VerificationSource,
    VerificationStatus,
};
use super::feedback::UserFacingError;
use super::gateway::{GatewayError, IdentityVerifier, VerificationGateway};
use super::retry::{RetryAssessment, RetryController, RetryRejection};
use super::sync::{CategoryResolver, StatusSynchronizer, SyncScope};
use super::upload::{UploadFile, UploadRejection};
use super::views::{DocumentStatusView, DocumentViews, TrackedDocument};
use crate::config::{PipelineConfig, SyncConfig};

/// Facade over the verification workflow: uploads, status, retry, override, audit.
pub struct DocumentVerificationService<G, V, A> {
    gateway: Arc<G>,
    gate: OverrideGate<V>,
    audit: Arc<A>,
    views: Arc<DocumentViews>,
    retry: RetryController,
    status_sync: Arc<StatusSynchronizer<G>>,
    category: Arc<CategoryResolver<G>>,
    pipeline: PipelineConfig,
}

/// Result of one file in a batch upload.
#[derive(Debug)]
pub struct UploadOutcome {
    pub file_name: String,
    pub result: Result<TrackedDocument, VerificationError>,
}

/// A confirmed override together with the audit entry written for it.
#[derive(Debug, Clone)]
pub struct OverrideReceipt {
    pub document: TrackedDocument,
    pub audit: AuditEntry,
}

impl<G, V, A> DocumentVerificationService<G, V, A>
where
    G: VerificationGateway + 'static,
    V: IdentityVerifier + 'static,
    A: AuditRecorder + 'static,
{
    pub fn new(
        gateway: Arc<G>,
        verifier: Arc<V>,
        audit: Arc<A>,
        pipeline: PipelineConfig,
        sync: SyncConfig,
    ) -> Self {
        let views = Arc::new(DocumentViews::new());
        let status_sync = Arc::new(StatusSynchronizer::new(
            gateway.clone(),
            views.clone(),
            sync.clone(),
            pipeline.read_timeout,
        ));
        let category = Arc::new(CategoryResolver::new(
            gateway.clone(),
            views.clone(),
            &sync,
            pipeline.read_timeout,
            pipeline.extraction_timeout,
        ));

        Self {
            gateway,
            gate: OverrideGate::new(verifier),
            audit,
            views,
            retry: RetryController,
            status_sync,
            category,
            pipeline,
        }
    }

    pub fn views(&self) -> &DocumentViews {
        &self.views
    }

    /// Fresh scope for polling tasks; tearing it down cancels everything it started.
    pub fn sync_scope(&self) -> SyncScope<G> {
        SyncScope::new(self.status_sync.clone(), self.category.clone())
    }

    /// Upload files concurrently and wait for all of them to settle.
    ///
    /// Each file is validated locally first. A failing file never affects the others.
    pub async fn upload_all(
        &self,
        candidate_id: &CandidateId,
        files: Vec<UploadFile>,
    ) -> Vec<UploadOutcome> {
        let uploads = files.into_iter().map(|file| async move {
            let result = self.upload_one(candidate_id, &file).await;
            if let Err(error) = &result {
                tracing::warn!(file_name = %file.file_name, %error, "upload failed");
            }
            UploadOutcome {
                file_name: file.file_name,
                result,
            }
        });
        futures::future::join_all(uploads).await
    }

    async fn upload_one(
        &self,
        candidate_id: &CandidateId,
        file: &UploadFile,
    ) -> Result<TrackedDocument, VerificationError> {
        file.validate()?;
        let limit = self.pipeline.upload_timeout_for(file.size() as u64);
        let document = with_timeout(
            "upload",
            limit,
            self.gateway.upload_document(file, candidate_id),
        )
        .await?;
        tracing::info!(
            document_id = %document.id,
            %candidate_id,
            file_name = %file.file_name,
            "document uploaded"
        );
        Ok(self.adopt(document))
    }

    fn adopt(&self, document: Document) -> TrackedDocument {
        let id = document.id.clone();
        let fallback = document.clone();
        match self.views.insert_confirmed(document).applied() {
            Some(tracked) => tracked,
            None => self.views.get(&id).unwrap_or(TrackedDocument {
                document: fallback,
                optimistic: false,
                confirmed_at: Utc::now(),
                sequence: 0,
            }),
        }
    }

    /// Fetch the confirmed status once and apply it if nothing newer has landed.
    pub async fn refresh(&self, document_id: &DocumentId) -> Result<TrackedDocument, VerificationError> {
        let ticket = self.views.begin_fetch(document_id);
        let document = with_timeout(
            "status fetch",
            self.pipeline.read_timeout,
            self.gateway.document_status(document_id),
        )
        .await?;
        match self.views.apply_confirmed(&ticket, document.clone()).applied() {
            Some(tracked) => Ok(tracked),
            None => Ok(self.views.get(document_id).unwrap_or(TrackedDocument {
                document,
                optimistic: false,
                confirmed_at: Utc::now(),
                sequence: ticket.sequence(),
            })),
        }
    }

    pub fn get(&self, document_id: &DocumentId) -> Option<TrackedDocument> {
        self.views.get(document_id)
    }

    /// Local view if present, otherwise a confirmed fetch.
    pub async fn document(&self, document_id: &DocumentId) -> Result<TrackedDocument, VerificationError> {
        match self.views.get(document_id) {
            Some(tracked) => Ok(tracked),
            None => self.refresh(document_id).await,
        }
    }

    pub async fn status_view(
        &self,
        document_id: &DocumentId,
        today: NaiveDate,
    ) -> Result<DocumentStatusView, VerificationError> {
        let tracked = self.document(document_id).await?;
        Ok(DocumentStatusView::build(
            &tracked,
            self.retry.assess(&tracked.document),
            self.gate.assess(&tracked.document),
            self.views.is_syncing(document_id),
            today,
        ))
    }

    pub async fn retry_eligibility(
        &self,
        document_id: &DocumentId,
    ) -> Result<RetryAssessment, VerificationError> {
        let tracked = self.document(document_id).await?;
        Ok(self.retry.assess(&tracked.document))
    }

    /// Resubmit a soft-terminal document.
    ///
    /// On acceptance the view shows `pending_ai` until the next confirmed fetch. If the call
    /// fails the document is left exactly as it was.
    pub async fn retry(&self, document_id: &DocumentId) -> Result<TrackedDocument, VerificationError> {
        let tracked = self.document(document_id).await?;
        if tracked.optimistic {
            return Err(RetryRejection::AwaitingConfirmation.into());
        }
        if let Err(rejection) = self.retry.check(&tracked.document) {
            tracing::warn!(%document_id, %rejection, "retry refused");
            return Err(rejection.into());
        }

        let ack = with_timeout(
            "reprocess",
            self.pipeline.write_timeout,
            self.gateway.reprocess_document(document_id),
        )
        .await?;
        tracing::info!(
            %document_id,
            request_id = ack.request_id.as_deref().unwrap_or("-"),
            "retry accepted"
        );

        match self.views.mark_retry_pending(document_id) {
            Some(pending) => Ok(pending),
            None => self.refresh(document_id).await,
        }
    }

    pub async fn override_eligibility(
        &self,
        document_id: &DocumentId,
    ) -> Result<OverrideEligibility, VerificationError> {
        let tracked = self.document(document_id).await?;
        Ok(self.gate.assess(&tracked.document))
    }

    /// Force a rejected document to verified after every local check passes.
    ///
    /// The audit slot is reserved before the remote call and committed only once the pipeline
    /// confirms the override, so the caller sees both or neither. A commit that fails after the
    /// remote call surfaces as `VerificationError::Audit` and no receipt is returned.
    pub async fn request_override(
        &self,
        request: OverrideRequest,
    ) -> Result<OverrideReceipt, VerificationError> {
        let document_id = request.document_id.clone();
        let tracked = self.document(&document_id).await?;
        let authorized = self.gate.authorize(&tracked.document, request).await?;

        let reservation = self.audit.reserve(&document_id)?;
        let remote = with_timeout(
            "override",
            self.pipeline.write_timeout,
            self.gateway.override_document(
                &document_id,
                &authorized.request.credential,
                &authorized.justification,
            ),
        )
        .await;

        let mut document = match remote {
            Ok(document) => document,
            Err(error) => {
                self.audit.release(reservation);
                tracing::warn!(%document_id, %error, "override call failed");
                return Err(error);
            }
        };

        if document.verification_status != VerificationStatus::Verified
            || document.verification_source != Some(VerificationSource::AdminOverride)
        {
            self.audit.release(reservation);
            tracing::warn!(
                %document_id,
                status = %document.verification_status,
                "pipeline did not confirm the override"
            );
            return Err(VerificationError::UnconfirmedOverride {
                document_id,
                status: document.verification_status,
            });
        }

        let rejection = document
            .rejection
            .get_or_insert_with(|| Rejection::new(authorized.prior_code.clone(), String::new()));
        let stamp = rejection
            .overridden
            .get_or_insert_with(|| OverrideStamp {
                by: authorized.actor.identity.clone(),
                at: Utc::now(),
                reason: authorized.justification.clone(),
            })
            .clone();

        let committed = self.audit.commit(
            reservation,
            AuditEntry {
                document_id: document_id.clone(),
                actor: authorized.actor.identity.clone(),
                recorded_at: stamp.at,
                justification: authorized.justification.clone(),
                prior_code: authorized.prior_code.clone(),
            },
        );
        let entry = match committed {
            Ok(entry) => entry,
            Err(error) => {
                tracing::error!(
                    %document_id,
                    actor = %authorized.actor.identity,
                    %error,
                    "pipeline applied the override but the audit entry was not recorded"
                );
                return Err(error.into());
            }
        };

        let tracked = self.adopt(document);
        tracing::info!(
            %document_id,
            actor = %entry.actor,
            prior_code = %entry.prior_code,
            "document overridden"
        );

        Ok(OverrideReceipt {
            document: tracked,
            audit: entry,
        })
    }

    pub fn audit_trail(&self, document_id: &DocumentId) -> Vec<AuditEntry> {
        self.audit.entries_for(document_id)
    }

    pub fn export_audit<W: std::io::Write>(&self, writer: W) -> Result<(), VerificationError> {
        export_csv(&self.audit.entries(), writer)?;
        Ok(())
    }

    pub fn health(&self, candidate_id: &CandidateId) -> DocumentHealth {
        let tracked = self.views.for_candidate(candidate_id);
        DocumentHealth::summarize(tracked.iter().map(|tracked| &tracked.document))
    }
}

async fn with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, VerificationError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(VerificationError::from),
        Err(_) => {
            tracing::warn!(operation, after_secs = limit.as_secs(), "safety timeout fired");
            Err(VerificationError::TimedOut {
                operation,
                after: limit,
            })
        }
    }
}

/// Error raised by the verification service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error(transparent)]
    Transport(#[from] GatewayError),
    #[error(transparent)]
    OverrideDenied(#[from] OverrideDenial),
    #[error(transparent)]
    RetryRefused(#[from] RetryRejection),
    #[error(transparent)]
    UploadRejected(#[from] UploadRejection),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error("{operation} timed out after {}s; state unknown", after.as_secs())]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },
    #[error("override of {document_id} was not confirmed; pipeline reports {status}")]
    UnconfirmedOverride {
        document_id: DocumentId,
        status: VerificationStatus,
    },
}

impl From<GateFailure> for VerificationError {
    fn from(failure: GateFailure) -> Self {
        match failure {
            GateFailure::Denied(denial) => VerificationError::OverrideDenied(denial),
            GateFailure::Transport(error) => VerificationError::Transport(error),
        }
    }
}

impl VerificationError {
    pub fn user_facing(&self) -> UserFacingError {
        use super::feedback::FailureCategory;

        match self {
            VerificationError::Transport(error) => UserFacingError::from(error),
            VerificationError::UploadRejected(rejection) => UserFacingError::from(rejection),
            VerificationError::TimedOut { operation, after } => {
                UserFacingError::timed_out(operation, *after)
            }
            VerificationError::OverrideDenied(_) => {
                UserFacingError::new(FailureCategory::Authorization, Some(self.to_string()))
            }
            VerificationError::RetryRefused(_)
            | VerificationError::Audit(_)
            | VerificationError::UnconfirmedOverride { .. } => {
                UserFacingError::new(FailureCategory::Unknown, Some(self.to_string()))
            }
        }
    }
}
