use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;

use super::super::domain::{CandidateId, DocumentId};
use super::super::gateway::VerificationGateway;
use super::category::{CategoryOutcome, CategoryResolver};
use super::status::StatusSynchronizer;
use super::{SyncOutcome, Visibility};

#[derive(Debug, Clone, PartialEq)]
pub enum SyncReport {
    Status {
        document_id: DocumentId,
        outcome: SyncOutcome,
    },
    Category {
        document_id: DocumentId,
        outcome: CategoryOutcome,
    },
}

/// Owns every polling task started for one consuming context.
///
/// Dropping the scope aborts its tasks; [`SyncScope::teardown`] also waits for them to stop.
pub struct SyncScope<G> {
    status: Arc<StatusSynchronizer<G>>,
    category: Arc<CategoryResolver<G>>,
    tasks: JoinSet<SyncReport>,
    cancel: watch::Sender<bool>,
    visibility: watch::Sender<Visibility>,
}

impl<G> SyncScope<G>
where
    G: VerificationGateway + 'static,
{
    pub fn new(status: Arc<StatusSynchronizer<G>>, category: Arc<CategoryResolver<G>>) -> Self {
        let (cancel, _) = watch::channel(false);
        let (visibility, _) = watch::channel(Visibility::Foreground);
        Self {
            status,
            category,
            tasks: JoinSet::new(),
            cancel,
            visibility,
        }
    }

    pub fn spawn_status(&mut self, document_id: DocumentId) {
        let synchronizer = self.status.clone();
        let visibility = self.visibility.subscribe();
        let cancel = self.cancel.subscribe();
        self.tasks.spawn(async move {
            let outcome = synchronizer.run(&document_id, visibility, cancel).await;
            SyncReport::Status {
                document_id,
                outcome,
            }
        });
    }

    pub fn spawn_category(&mut self, document_id: DocumentId, candidate_id: CandidateId) {
        let resolver = self.category.clone();
        let cancel = self.cancel.subscribe();
        self.tasks.spawn(async move {
            let outcome = resolver.resolve(&document_id, &candidate_id, cancel).await;
            SyncReport::Category {
                document_id,
                outcome,
            }
        });
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        self.visibility.send_replace(visibility);
    }

    pub fn active(&self) -> usize {
        self.tasks.len()
    }

    /// Next finished task, or `None` once every task has been collected.
    pub async fn next_report(&mut self) -> Option<SyncReport> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(report) => return Some(report),
                Err(error) => tracing::warn!(%error, "sync task ended abnormally"),
            }
        }
        None
    }

    /// Cancel every task and wait until none can fire again.
    pub async fn teardown(mut self) {
        self.cancel.send_replace(true);
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        tracing::debug!("sync scope torn down");
    }
}
