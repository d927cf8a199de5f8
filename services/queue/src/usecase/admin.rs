use tracing::info;

use paynotify_domain::channel::Channel;
use paynotify_domain::id::{JobId, join_ids};
use paynotify_domain::state::TerminalState;

use crate::domain::repository::QueueStore;
use crate::domain::types::{NewQueueEntry, StateCounts};
use crate::error::QueueServiceError;

// ── EnqueueJob ───────────────────────────────────────────────────────────────

pub struct EnqueueJobUseCase<S: QueueStore> {
    pub store: S,
}

impl<S: QueueStore> EnqueueJobUseCase<S> {
    pub async fn execute(&self, entry: NewQueueEntry) -> Result<JobId, QueueServiceError> {
        let id = self.store.enqueue(&entry).await?;
        info!(
            job_id = %id,
            order_id = %entry.order_id,
            client_id = %entry.client_id,
            channel = %entry.channel,
            "job enqueued"
        );
        Ok(id)
    }
}

// ── SkipJobs ─────────────────────────────────────────────────────────────────

/// Manually withdraw jobs from delivery.
pub struct SkipJobsUseCase<S: QueueStore> {
    pub store: S,
}

impl<S: QueueStore> SkipJobsUseCase<S> {
    /// Returns the number of jobs moved to `Skipped`. Unknown ids fail with
    /// `JobNotFound` before anything changes; terminal jobs are left alone.
    pub async fn execute(&self, ids: &[JobId]) -> Result<u64, QueueServiceError> {
        for id in ids {
            if self.store.find_by_id(*id).await?.is_none() {
                return Err(QueueServiceError::JobNotFound(*id));
            }
        }
        let skipped = self.store.finalize(ids, TerminalState::Skipped).await?;
        info!(job_ids = %join_ids(ids), skipped, "jobs skipped");
        Ok(skipped)
    }
}

// ── QueueStats ───────────────────────────────────────────────────────────────

pub struct QueueStatsUseCase<S: QueueStore> {
    pub store: S,
}

impl<S: QueueStore> QueueStatsUseCase<S> {
    pub async fn execute(
        &self,
        channels: &[Channel],
    ) -> Result<Vec<(Channel, StateCounts)>, QueueServiceError> {
        let mut stats = Vec::with_capacity(channels.len());
        for channel in channels {
            stats.push((*channel, self.store.count_by_state(*channel).await?));
        }
        Ok(stats)
    }
}
