use tracing::{info, warn};

use paynotify_domain::channel::Channel;
use paynotify_domain::id::{ClientId, JobId, join_ids};

use crate::domain::repository::QueueStore;
use crate::domain::types::{LockThreshold, MaintenanceReport};
use crate::error::QueueServiceError;

// ── Lease manager ────────────────────────────────────────────────────────────

/// Lock protocol over a [`QueueStore`]: claim a client's batch, recover batches
/// abandoned by crashed workers, and give up on batches that keep failing.
pub struct LeaseManager<S: QueueStore> {
    pub store: S,
    pub threshold: LockThreshold,
}

impl<S: QueueStore> LeaseManager<S> {
    pub async fn lock_client_jobs(
        &self,
        client_id: ClientId,
        channel: Channel,
    ) -> Result<Vec<JobId>, QueueServiceError> {
        self.store.lock_client_jobs(client_id, channel).await
    }

    pub async fn reclaim_stale_locks(
        &self,
        channel: Channel,
    ) -> Result<Vec<JobId>, QueueServiceError> {
        self.store
            .reclaim_stale_locks(channel, self.threshold.get())
            .await
    }

    pub async fn fail_stale_locks(&self, channel: Channel) -> Result<Vec<JobId>, QueueServiceError> {
        self.store.fail_stale_locks(channel, self.threshold.get()).await
    }

    /// One maintenance pass: drop superseded locks, requeue the rest below the
    /// threshold, then fail whatever reached it.
    pub async fn maintain(&self, channel: Channel) -> Result<MaintenanceReport, QueueServiceError> {
        let superseded = self.store.skip_superseded_locks(channel).await?;
        if !superseded.is_empty() {
            info!(
                channel = %channel,
                job_ids = %join_ids(&superseded),
                "skipped locked jobs superseded by newer entries"
            );
        }

        let reclaimed = self.reclaim_stale_locks(channel).await?;
        if !reclaimed.is_empty() {
            info!(
                channel = %channel,
                job_ids = %join_ids(&reclaimed),
                "requeued stale locked jobs"
            );
        }

        let failed = self.fail_stale_locks(channel).await?;
        if !failed.is_empty() {
            warn!(
                channel = %channel,
                max_lock_count = self.threshold.get(),
                job_ids = %join_ids(&failed),
                "jobs exceeded lock threshold and were marked failed"
            );
        }

        Ok(MaintenanceReport {
            superseded,
            reclaimed,
            failed,
        })
    }
}
