use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use super::super::domain::DocumentId;
use super::super::gateway::{GatewayError, VerificationGateway};
use super::super::views::{ApplyOutcome, DocumentViews};
use super::backoff::BackoffSchedule;
use super::{cancelled, SyncOutcome, Visibility};
use crate::config::SyncConfig;

/// Polls one document until it leaves `pending_ai` or a bound is reached.
pub struct StatusSynchronizer<G> {
    gateway: Arc<G>,
    views: Arc<DocumentViews>,
    config: SyncConfig,
    fetch_timeout: Duration,
}

impl<G> StatusSynchronizer<G>
where
    G: VerificationGateway + 'static,
{
    pub fn new(
        gateway: Arc<G>,
        views: Arc<DocumentViews>,
        config: SyncConfig,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            views,
            config,
            fetch_timeout,
        }
    }

    /// Hard upper bound on one session, independent of the attempt and wall-clock bounds.
    pub fn safety_timeout(&self) -> Duration {
        self.config
            .max_wait
            .saturating_add(self.config.max_interval)
            .saturating_add(self.fetch_timeout)
    }

    pub async fn run(
        &self,
        document_id: &DocumentId,
        mut visibility: watch::Receiver<Visibility>,
        mut cancel: watch::Receiver<bool>,
    ) -> SyncOutcome {
        let _syncing = self.views.begin_sync(document_id);
        let safety = self.safety_timeout();

        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                tracing::debug!(%document_id, "status sync cancelled");
                SyncOutcome::Cancelled
            }
            result = tokio::time::timeout(safety, self.poll(document_id, &mut visibility)) => {
                match result {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::warn!(%document_id, after_secs = safety.as_secs(), "status sync abandoned");
                        SyncOutcome::TimedOut { after: safety }
                    }
                }
            }
        }
    }

    async fn poll(
        &self,
        document_id: &DocumentId,
        visibility: &mut watch::Receiver<Visibility>,
    ) -> SyncOutcome {
        let started = Instant::now();
        let mut schedule = BackoffSchedule::new(self.config.min_interval, self.config.max_interval);
        let mut last_seen = *visibility.borrow_and_update();
        let mut attempts = 0u32;

        loop {
            let foregrounded = wait_or_foreground(schedule.current(), visibility, &mut last_seen).await;
            if foregrounded {
                tracing::debug!(%document_id, "foregrounded; polling now");
                schedule.reset();
            }

            attempts += 1;
            let ticket = self.views.begin_fetch(document_id);
            let fetched =
                match tokio::time::timeout(self.fetch_timeout, self.gateway.document_status(document_id))
                    .await
                {
                    Ok(Ok(document)) => document,
                    Ok(Err(error)) => {
                        tracing::warn!(%document_id, %error, "status fetch failed");
                        return SyncOutcome::FetchFailed(error);
                    }
                    Err(_) => {
                        return SyncOutcome::FetchFailed(GatewayError::TimedOut {
                            operation: "status fetch",
                            after: self.fetch_timeout,
                        })
                    }
                };

            match self.views.apply_confirmed(&ticket, fetched) {
                ApplyOutcome::Applied(tracked) => {
                    tracing::debug!(
                        %document_id,
                        attempts,
                        status = %tracked.document.verification_status,
                        "status polled"
                    );
                    if !tracked.document.verification_status.is_pending() {
                        return SyncOutcome::Settled(tracked);
                    }
                }
                ApplyOutcome::Stale { .. } => {
                    if let Some(current) = self.views.get(document_id) {
                        if !current.optimistic && !current.document.verification_status.is_pending()
                        {
                            return SyncOutcome::Settled(current);
                        }
                    }
                }
            }

            let elapsed = started.elapsed();
            if attempts >= self.config.max_attempts || elapsed >= self.config.max_wait {
                tracing::info!(%document_id, attempts, "status undetermined at polling bound");
                return SyncOutcome::Undetermined { attempts, elapsed };
            }
            // A foreground poll restarts the schedule at its minimum interval.
            if !foregrounded {
                schedule.advance();
            }
        }
    }
}

/// Sleep for `delay`, returning early with `true` on a background-to-foreground transition.
async fn wait_or_foreground(
    delay: Duration,
    visibility: &mut watch::Receiver<Visibility>,
    last_seen: &mut Visibility,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = visibility.changed() => {
                if changed.is_err() {
                    sleep.as_mut().await;
                    return false;
                }
                let now = *visibility.borrow_and_update();
                let previous = std::mem::replace(last_seen, now);
                if previous == Visibility::Background && now == Visibility::Foreground {
                    return true;
                }
            }
        }
    }
}
