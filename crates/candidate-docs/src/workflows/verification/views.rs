//! Local read view of pipeline documents.
//!
//! Each document has one authoritative local copy, replaced only by the most recent confirmed
//! fetch. The single local write is the optimistic `pending_ai` after an accepted retry, which
//! the next confirmed fetch supersedes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::authorization::{OverrideEligibility, OverridePolicy};
use super::catalog::{format_mismatch_fields, Severity};
use super::domain::{
    CandidateId, Document, DocumentCategory, DocumentId, VerificationSource, VerificationStatus,
};
use super::lifecycle::{self, DisplayState};
use super::retry::RetryAssessment;

/// Sequence number taken when a fetch is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    document_id: DocumentId,
    sequence: u64,
}

impl FetchTicket {
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// A document as currently held locally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedDocument {
    pub document: Document,
    /// True while the view shows an unconfirmed `pending_ai` after a retry.
    pub optimistic: bool,
    pub confirmed_at: DateTime<Utc>,
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied(TrackedDocument),
    /// A later-issued fetch already landed; this result was dropped.
    Stale { sequence: u64, current: u64 },
}

impl ApplyOutcome {
    pub fn applied(self) -> Option<TrackedDocument> {
        match self {
            ApplyOutcome::Applied(tracked) => Some(tracked),
            ApplyOutcome::Stale { .. } => None,
        }
    }
}

struct Entry {
    tracked: TrackedDocument,
    floor: u64,
    syncing: bool,
}

#[derive(Default)]
pub struct DocumentViews {
    entries: Mutex<HashMap<DocumentId, Entry>>,
    sequence: AtomicU64,
    policy: OverridePolicy,
}

impl DocumentViews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: OverridePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DocumentId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn begin_fetch(&self, document_id: &DocumentId) -> FetchTicket {
        FetchTicket {
            document_id: document_id.clone(),
            sequence: self.next_sequence(),
        }
    }

    /// Record a document returned directly by the pipeline, such as an upload response.
    pub fn insert_confirmed(&self, document: Document) -> ApplyOutcome {
        let ticket = self.begin_fetch(&document.id);
        self.apply_confirmed(&ticket, document)
    }

    /// Apply a confirmed fetch unless a later-issued one has already been applied.
    pub fn apply_confirmed(&self, ticket: &FetchTicket, mut document: Document) -> ApplyOutcome {
        self.normalize(&mut document);

        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(&ticket.document_id) {
            let current = entry.tracked.sequence.max(entry.floor);
            if ticket.sequence <= current {
                tracing::debug!(
                    document_id = %ticket.document_id,
                    sequence = ticket.sequence,
                    current,
                    "dropping stale status fetch"
                );
                return ApplyOutcome::Stale {
                    sequence: ticket.sequence,
                    current,
                };
            }

            let previous = entry.tracked.document.verification_status;
            let next = document.verification_status;
            if previous != next || entry.tracked.optimistic {
                let cause = lifecycle::infer_cause(previous, &document);
                if !entry.tracked.optimistic && !lifecycle::is_permitted(previous, next, cause) {
                    tracing::warn!(
                        document_id = %ticket.document_id,
                        from = %previous,
                        to = %next,
                        ?cause,
                        "pipeline reported an unexpected transition"
                    );
                } else {
                    tracing::info!(
                        document_id = %ticket.document_id,
                        from = %previous,
                        to = %next,
                        "verification status confirmed"
                    );
                }
            }

            entry.tracked = TrackedDocument {
                document,
                optimistic: false,
                confirmed_at: Utc::now(),
                sequence: ticket.sequence,
            };
            return ApplyOutcome::Applied(entry.tracked.clone());
        }

        let tracked = TrackedDocument {
            document,
            optimistic: false,
            confirmed_at: Utc::now(),
            sequence: ticket.sequence,
        };
        entries.insert(
            ticket.document_id.clone(),
            Entry {
                tracked: tracked.clone(),
                floor: 0,
                syncing: false,
            },
        );
        ApplyOutcome::Applied(tracked)
    }

    fn normalize(&self, document: &mut Document) {
        if let Some(rejection) = document.rejection.as_mut() {
            self.policy.normalize(rejection);
            if rejection.retry_count > rejection.max_retries {
                tracing::warn!(
                    document_id = %document.id,
                    retry_count = rejection.retry_count,
                    max_retries = rejection.max_retries,
                    "clamping retry count reported above its budget"
                );
                rejection.retry_count = rejection.max_retries;
            }
        }
        if document.verification_status != VerificationStatus::Verified
            && document.verification_source.is_some()
        {
            document.verification_source = None;
        }

        // The stamp is the evidence of an override; a source without one, or a stamp left on a
        // document the pipeline no longer reports as overridden, is dropped.
        let stamped = document
            .rejection
            .as_ref()
            .is_some_and(|rejection| rejection.overridden.is_some());
        match (document.is_overridden(), stamped) {
            (true, false) => {
                tracing::warn!(
                    document_id = %document.id,
                    "admin override reported without an override stamp"
                );
                document.verification_source = None;
            }
            (false, true) => {
                tracing::warn!(
                    document_id = %document.id,
                    source = ?document.verification_source,
                    "override stamp reported without an admin override source"
                );
                if let Some(rejection) = document.rejection.as_mut() {
                    rejection.overridden = None;
                }
            }
            _ => {}
        }
    }

    /// Show `pending_ai` after the pipeline accepted a retry.
    ///
    /// Fetches issued before this call are treated as stale. `retry_count` is left as last
    /// confirmed; the pipeline increments it.
    pub fn mark_retry_pending(&self, document_id: &DocumentId) -> Option<TrackedDocument> {
        let floor = self.next_sequence();
        let mut entries = self.lock();
        let entry = entries.get_mut(document_id)?;
        entry.floor = floor;
        entry.tracked.optimistic = true;
        entry.tracked.document.verification_status = VerificationStatus::PendingAi;
        entry.tracked.document.verification_source = None;
        Some(entry.tracked.clone())
    }

    pub fn get(&self, document_id: &DocumentId) -> Option<TrackedDocument> {
        self.lock()
            .get(document_id)
            .map(|entry| entry.tracked.clone())
    }

    pub fn for_candidate(&self, candidate_id: &CandidateId) -> Vec<TrackedDocument> {
        let mut documents: Vec<TrackedDocument> = self
            .lock()
            .values()
            .filter(|entry| &entry.tracked.document.candidate_id == candidate_id)
            .map(|entry| entry.tracked.clone())
            .collect();
        documents.sort_by(|a, b| a.document.id.cmp(&b.document.id));
        documents
    }

    pub fn is_syncing(&self, document_id: &DocumentId) -> bool {
        self.lock()
            .get(document_id)
            .map(|entry| entry.syncing)
            .unwrap_or(false)
    }

    /// Mark a document as being synchronized until the returned guard drops.
    pub fn begin_sync<'a>(&'a self, document_id: &DocumentId) -> SyncGuard<'a> {
        if let Some(entry) = self.lock().get_mut(document_id) {
            entry.syncing = true;
        }
        SyncGuard {
            views: self,
            document_id: document_id.clone(),
        }
    }
}

/// Clears the in-progress flag on drop, including when a sync is abandoned by a timeout.
pub struct SyncGuard<'a> {
    views: &'a DocumentViews,
    document_id: DocumentId,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        if let Some(entry) = self.views.lock().get_mut(&self.document_id) {
            entry.syncing = false;
        }
    }
}

/// Rejection details shaped for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionSummary {
    pub code: String,
    pub reason: String,
    pub description: String,
    pub severity: Severity,
    pub mismatch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f64>,
}

/// Sanitized status exposed over HTTP and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentStatusView {
    pub document_id: DocumentId,
    pub candidate_id: CandidateId,
    pub file_name: String,
    pub status: &'static str,
    pub display_state: DisplayState,
    pub display_label: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<DocumentCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_source: Option<VerificationSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionSummary>,
    pub retry: RetryAssessment,
    #[serde(rename = "override")]
    pub override_eligibility: OverrideEligibility,
    pub awaiting_confirmation: bool,
    pub syncing: bool,
}

impl DocumentStatusView {
    pub fn build(
        tracked: &TrackedDocument,
        retry: RetryAssessment,
        override_eligibility: OverrideEligibility,
        syncing: bool,
        today: chrono::NaiveDate,
    ) -> Self {
        let document = &tracked.document;
        let display_state = lifecycle::display_state(document, today);
        Self {
            document_id: document.id.clone(),
            candidate_id: document.candidate_id.clone(),
            file_name: document.file_name.clone(),
            status: document.verification_status.label(),
            display_state,
            display_label: display_state.label(),
            description: display_state.description(),
            category: document.category,
            verification_source: document.verification_source,
            confidence_score: super::confidence::normalize(&document.extraction_confidence),
            rejection: document.rejection.as_ref().map(|rejection| RejectionSummary {
                code: rejection.code.to_string(),
                reason: rejection.reason.clone(),
                description: rejection.code.description(),
                severity: rejection.code.severity(),
                mismatch: format_mismatch_fields(&rejection.mismatch_fields),
                ai_confidence: rejection.ai_confidence,
                ocr_confidence: rejection.ocr_confidence,
            }),
            retry,
            override_eligibility,
            awaiting_confirmation: tracked.optimistic,
            syncing,
        }
    }
}
