use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use super::super::domain::{CandidateId, Document, DocumentCategory, DocumentId};
use super::super::gateway::{ExtractionResult, GatewayError, VerificationGateway};
use super::super::views::{ApplyOutcome, DocumentViews};
use super::cancelled;
use crate::config::SyncConfig;

/// How category resolution for a fresh upload ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryOutcome {
    /// The document resolved to a CV and extraction succeeded.
    Extracted { document: Document, data: Value },
    /// The document resolved to a CV but the extraction step reported an error.
    ExtractionFailed {
        document_id: DocumentId,
        error: String,
    },
    /// The category never resolved to CV. An expected outcome, not an error.
    NotCv {
        document_id: DocumentId,
        attempts: u32,
        category: Option<DocumentCategory>,
    },
    FetchFailed(GatewayError),
    TimedOut {
        operation: &'static str,
        after: Duration,
    },
    Cancelled,
}

/// Waits for a fresh upload to be classified and triggers extraction for CVs.
pub struct CategoryResolver<G> {
    gateway: Arc<G>,
    views: Arc<DocumentViews>,
    attempts: u32,
    interval: Duration,
    fetch_timeout: Duration,
    extraction_timeout: Duration,
}

impl<G> CategoryResolver<G>
where
    G: VerificationGateway + 'static,
{
    pub fn new(
        gateway: Arc<G>,
        views: Arc<DocumentViews>,
        config: &SyncConfig,
        fetch_timeout: Duration,
        extraction_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            views,
            attempts: config.category_attempts,
            interval: config.category_interval,
            fetch_timeout,
            extraction_timeout,
        }
    }

    pub fn safety_timeout(&self) -> Duration {
        self.interval
            .saturating_add(self.fetch_timeout)
            .saturating_mul(self.attempts)
            .saturating_add(self.extraction_timeout)
    }

    pub async fn resolve(
        &self,
        document_id: &DocumentId,
        candidate_id: &CandidateId,
        mut cancel: watch::Receiver<bool>,
    ) -> CategoryOutcome {
        let safety = self.safety_timeout();
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => CategoryOutcome::Cancelled,
            result = tokio::time::timeout(safety, self.poll(document_id, candidate_id)) => {
                result.unwrap_or(CategoryOutcome::TimedOut {
                    operation: "category resolution",
                    after: safety,
                })
            }
        }
    }

    async fn poll(&self, document_id: &DocumentId, candidate_id: &CandidateId) -> CategoryOutcome {
        let mut category = None;
        for attempt in 1..=self.attempts {
            tokio::time::sleep(self.interval).await;

            let ticket = self.views.begin_fetch(document_id);
            let document = match tokio::time::timeout(
                self.fetch_timeout,
                self.gateway.document_status(document_id),
            )
            .await
            {
                Ok(Ok(document)) => document,
                Ok(Err(error)) => return CategoryOutcome::FetchFailed(error),
                Err(_) => {
                    return CategoryOutcome::FetchFailed(GatewayError::TimedOut {
                        operation: "status fetch",
                        after: self.fetch_timeout,
                    })
                }
            };
            let document = match self.views.apply_confirmed(&ticket, document) {
                ApplyOutcome::Applied(tracked) => tracked.document,
                ApplyOutcome::Stale { .. } => continue,
            };

            category = document.category;
            tracing::debug!(%document_id, attempt, ?category, "category polled");

            match document.category {
                Some(DocumentCategory::Cv) => {
                    return self.extract(document, candidate_id).await;
                }
                Some(_) if !document.verification_status.is_pending() => {
                    return CategoryOutcome::NotCv {
                        document_id: document_id.clone(),
                        attempts: attempt,
                        category,
                    };
                }
                _ => {}
            }
        }

        tracing::info!(%document_id, attempts = self.attempts, "no CV category; skipping extraction");
        CategoryOutcome::NotCv {
            document_id: document_id.clone(),
            attempts: self.attempts,
            category,
        }
    }

    async fn extract(&self, document: Document, candidate_id: &CandidateId) -> CategoryOutcome {
        let Some(storage_ref) = document.storage_ref.clone() else {
            return CategoryOutcome::ExtractionFailed {
                document_id: document.id,
                error: "document has no storage reference".to_string(),
            };
        };

        let trigger = self.gateway.trigger_extraction(candidate_id, &storage_ref);
        match tokio::time::timeout(self.extraction_timeout, trigger).await {
            Ok(Ok(ExtractionResult::Extracted { data })) => {
                tracing::info!(document_id = %document.id, "CV extraction completed");
                CategoryOutcome::Extracted { document, data }
            }
            Ok(Ok(ExtractionResult::Rejected { error })) => {
                tracing::warn!(document_id = %document.id, %error, "CV extraction rejected");
                CategoryOutcome::ExtractionFailed {
                    document_id: document.id,
                    error,
                }
            }
            Ok(Err(error)) => CategoryOutcome::ExtractionFailed {
                document_id: document.id,
                error: error
                    .remote_text()
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string()),
            },
            Err(_) => CategoryOutcome::TimedOut {
                operation: "extraction",
                after: self.extraction_timeout,
            },
        }
    }
}
