use serde::Serialize;

use super::domain::{Document, VerificationStatus};

/// Why a retry was refused locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryRejection {
    #[error("documents in {0} cannot be retried")]
    NotSoftTerminal(VerificationStatus),
    #[error("document has no rejection details")]
    NoRejectionDetails,
    #[error("the pipeline reports this rejection as not retryable")]
    NotRetryable,
    #[error("retry budget exhausted ({used} of {max})")]
    BudgetExhausted { used: u32, max: u32 },
    #[error("a previous retry has not been confirmed yet")]
    AwaitingConfirmation,
}

/// Snapshot of the retry budget as seen in the last confirmed fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryAssessment {
    pub can_retry: bool,
    pub retry_count: u32,
    pub max_retries: u32,
    pub remaining: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Decides whether a soft-terminal document may be resubmitted.
///
/// `retry_count` is owned by the pipeline; it is read here and never incremented locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryController;

impl RetryController {
    pub fn check(&self, document: &Document) -> Result<(), RetryRejection> {
        if !document.verification_status.is_soft_terminal() {
            return Err(RetryRejection::NotSoftTerminal(
                document.verification_status,
            ));
        }
        let rejection = document
            .rejection
            .as_ref()
            .ok_or(RetryRejection::NoRejectionDetails)?;
        if !rejection.retry_possible {
            return Err(RetryRejection::NotRetryable);
        }
        if rejection.retry_count >= rejection.max_retries {
            return Err(RetryRejection::BudgetExhausted {
                used: rejection.retry_count,
                max: rejection.max_retries,
            });
        }
        Ok(())
    }

    pub fn can_retry(&self, document: &Document) -> bool {
        self.check(document).is_ok()
    }

    pub fn assess(&self, document: &Document) -> RetryAssessment {
        let (retry_count, max_retries) = document
            .rejection
            .as_ref()
            .map(|rejection| (rejection.retry_count, rejection.max_retries))
            .unwrap_or((0, 0));
        let verdict = self.check(document);
        RetryAssessment {
            can_retry: verdict.is_ok(),
            retry_count,
            max_retries,
            remaining: max_retries.saturating_sub(retry_count),
            reason: verdict.err().map(|rejection| rejection.to_string()),
        }
    }
}
