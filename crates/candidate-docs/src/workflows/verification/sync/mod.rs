//! Status synchronization after upload or retry.
//!
//! Each document is polled by its own task with its own backoff state. Tasks are owned by a
//! [`SyncScope`]; tearing the scope down cancels every outstanding timer it started.

mod backoff;
mod category;
mod scope;
mod status;

use std::time::Duration;

use serde::Serialize;

use super::gateway::GatewayError;
use super::views::TrackedDocument;

pub use backoff::{BackoffSchedule, BACKOFF_MULTIPLIER};
pub use category::{CategoryOutcome, CategoryResolver};
pub use scope::{SyncReport, SyncScope};
pub use status::StatusSynchronizer;

/// Whether the consuming context is currently being watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Foreground,
    Background,
}

/// How a status polling session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The document left `pending_ai`.
    Settled(TrackedDocument),
    /// The attempt or wall-clock bound was reached while still pending. Not a failure.
    Undetermined { attempts: u32, elapsed: Duration },
    /// A status fetch failed; the session ends without retrying.
    FetchFailed(GatewayError),
    /// The hard safety timeout fired; the remote state is unknown.
    TimedOut { after: Duration },
    Cancelled,
}

impl SyncOutcome {
    pub fn summary(&self) -> String {
        match self {
            SyncOutcome::Settled(tracked) => format!(
                "settled as {}",
                tracked.document.verification_status.label()
            ),
            SyncOutcome::Undetermined { attempts, elapsed } => format!(
                "still processing after {attempts} checks over {}s; status undetermined",
                elapsed.as_secs()
            ),
            SyncOutcome::FetchFailed(error) => format!("status check failed: {error}"),
            SyncOutcome::TimedOut { after } => format!(
                "timed out after {}s; state unknown",
                after.as_secs()
            ),
            SyncOutcome::Cancelled => "cancelled".to_string(),
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, SyncOutcome::Settled(_))
    }
}

/// Resolves once cancellation is requested or the owning context is gone.
pub(crate) async fn cancelled(cancel: &mut tokio::sync::watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}
