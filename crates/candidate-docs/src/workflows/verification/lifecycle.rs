//! Verification state machine.
//!
//! `pending_ai` is entered on upload or retry and resolves to one of four outcomes. `verified`
//! is final; the other three outcomes are soft-terminal and can only be left through a retry
//! (back to `pending_ai`) or an override (to `verified`). Local state never advances on its own:
//! every transition here is checked against a status confirmed by the pipeline.

use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{Document, DocumentCategory, VerificationSource, VerificationStatus};

/// What caused a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCause {
    /// The AI pipeline finished processing.
    Pipeline,
    /// The document was resubmitted through the retry controller.
    Retry,
    /// An administrator forced the document to verified.
    Override,
    /// A reviewer resolved a `needs_review` document by hand.
    ManualReview,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transition {from} -> {to} is not permitted via {cause:?}")]
pub struct TransitionError {
    pub from: VerificationStatus,
    pub to: VerificationStatus,
    pub cause: TransitionCause,
}

pub fn is_permitted(
    from: VerificationStatus,
    to: VerificationStatus,
    cause: TransitionCause,
) -> bool {
    use VerificationStatus::*;

    match cause {
        TransitionCause::Pipeline => from == PendingAi,
        TransitionCause::Retry => from.is_soft_terminal() && to == PendingAi,
        TransitionCause::Override => matches!(from, RejectedMismatch | Failed) && to == Verified,
        TransitionCause::ManualReview => {
            from == NeedsReview && matches!(to, Verified | RejectedMismatch)
        }
    }
}

pub fn transition(
    from: VerificationStatus,
    to: VerificationStatus,
    cause: TransitionCause,
) -> Result<VerificationStatus, TransitionError> {
    if is_permitted(from, to, cause) {
        Ok(to)
    } else {
        Err(TransitionError { from, to, cause })
    }
}

/// Infer why a confirmed fetch moved a document from `previous` to the fetched status.
pub fn infer_cause(previous: VerificationStatus, fetched: &Document) -> TransitionCause {
    let to = fetched.verification_status;
    if to == VerificationStatus::PendingAi && previous != VerificationStatus::PendingAi {
        return TransitionCause::Retry;
    }
    match fetched.verification_source {
        Some(VerificationSource::AdminOverride) if to == VerificationStatus::Verified => {
            TransitionCause::Override
        }
        Some(VerificationSource::ManualReview) => TransitionCause::ManualReview,
        _ => TransitionCause::Pipeline,
    }
}

/// Display-level state. Derived from a confirmed status plus local, deterministic checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Processing,
    Verified,
    Expired,
    NeedsReview,
    Rejected,
    Failed,
}

impl DisplayState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Processing => "Processing",
            Self::Verified => "Verified",
            Self::Expired => "Expired",
            Self::NeedsReview => "Needs Review",
            Self::Rejected => "Rejected",
            Self::Failed => "Failed",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Processing => "AI is analyzing the document and verifying identity",
            Self::Verified => "Identity confirmed",
            Self::Expired => "Document was verified but has since expired",
            Self::NeedsReview => "Manual review required",
            Self::Rejected => "Identity mismatch detected",
            Self::Failed => "AI processing failed",
        }
    }
}

/// Map a confirmed document to its display state as of `today`.
///
/// A passport is only shown as verified while its expiry date lies in the future, whatever
/// the pipeline said. This check never promotes a rejected document.
pub fn display_state(document: &Document, today: NaiveDate) -> DisplayState {
    match document.verification_status {
        VerificationStatus::PendingAi => DisplayState::Processing,
        VerificationStatus::Verified => {
            if passport_expired(document, today) {
                DisplayState::Expired
            } else {
                DisplayState::Verified
            }
        }
        VerificationStatus::NeedsReview => DisplayState::NeedsReview,
        VerificationStatus::RejectedMismatch => DisplayState::Rejected,
        VerificationStatus::Failed => DisplayState::Failed,
    }
}

fn passport_expired(document: &Document, today: NaiveDate) -> bool {
    document.category == Some(DocumentCategory::Passport)
        && document
            .expiry_date
            .map(|expiry| expiry <= today)
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::verification::domain::{CandidateId, DocumentId};
    use std::collections::BTreeMap;
    use VerificationStatus::*;

    fn document(status: VerificationStatus) -> Document {
        Document {
            id: DocumentId("doc-1".to_string()),
            candidate_id: CandidateId("cand-1".to_string()),
            file_name: "passport.pdf".to_string(),
            storage_ref: None,
            category: Some(DocumentCategory::Passport),
            verification_status: status,
            verification_source: None,
            rejection: None,
            expiry_date: None,
            extraction_confidence: BTreeMap::new(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn pipeline_only_resolves_pending_documents() {
        for to in [Verified, NeedsReview, RejectedMismatch, Failed] {
            assert!(is_permitted(PendingAi, to, TransitionCause::Pipeline));
        }
        assert!(!is_permitted(Verified, Failed, TransitionCause::Pipeline));
        assert!(!is_permitted(Failed, Verified, TransitionCause::Pipeline));
    }

    #[test]
    fn verified_is_globally_terminal() {
        assert!(transition(Verified, PendingAi, TransitionCause::Retry).is_err());
        assert!(transition(Verified, Verified, TransitionCause::Override).is_err());
    }

    #[test]
    fn soft_terminal_states_leave_through_retry_or_override() {
        for from in [NeedsReview, RejectedMismatch, Failed] {
            assert_eq!(
                transition(from, PendingAi, TransitionCause::Retry),
                Ok(PendingAi)
            );
        }
        assert!(is_permitted(
            RejectedMismatch,
            Verified,
            TransitionCause::Override
        ));
        assert!(is_permitted(Failed, Verified, TransitionCause::Override));
        assert!(!is_permitted(NeedsReview, Verified, TransitionCause::Override));
        assert!(is_permitted(NeedsReview, Verified, TransitionCause::ManualReview));
    }

    #[test]
    fn expired_passport_is_not_displayed_as_verified() {
        let mut passport = document(Verified);
        passport.expiry_date = Some(date(2024, 1, 31));
        assert_eq!(
            display_state(&passport, date(2025, 6, 1)),
            DisplayState::Expired
        );

        passport.expiry_date = Some(date(2030, 1, 31));
        assert_eq!(
            display_state(&passport, date(2025, 6, 1)),
            DisplayState::Verified
        );
    }

    #[test]
    fn passport_expiring_today_counts_as_expired() {
        let mut passport = document(Verified);
        passport.expiry_date = Some(date(2025, 6, 1));
        assert_eq!(
            display_state(&passport, date(2025, 6, 1)),
            DisplayState::Expired
        );
    }

    #[test]
    fn expiry_never_promotes_or_touches_other_categories() {
        let mut rejected = document(RejectedMismatch);
        rejected.expiry_date = Some(date(2030, 1, 1));
        assert_eq!(
            display_state(&rejected, date(2025, 6, 1)),
            DisplayState::Rejected
        );

        let mut certificate = document(Verified);
        certificate.category = Some(DocumentCategory::Certificate);
        certificate.expiry_date = Some(date(2020, 1, 1));
        assert_eq!(
            display_state(&certificate, date(2025, 6, 1)),
            DisplayState::Verified
        );
    }

    #[test]
    fn infers_override_and_retry_causes() {
        let mut overridden = document(Verified);
        overridden.verification_source = Some(VerificationSource::AdminOverride);
        assert_eq!(
            infer_cause(RejectedMismatch, &overridden),
            TransitionCause::Override
        );
        assert_eq!(
            infer_cause(Failed, &document(PendingAi)),
            TransitionCause::Retry
        );
        assert_eq!(
            infer_cause(PendingAi, &document(Failed)),
            TransitionCause::Pipeline
        );
    }
}
