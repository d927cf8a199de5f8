#![allow(async_fn_in_trait)]

use std::collections::HashMap;

use paynotify_domain::channel::Channel;
use paynotify_domain::id::{ClientId, JobId, OrderId, RecipientId};
use paynotify_domain::state::TerminalState;

use crate::domain::types::{
    ContactRole, CuratorLink, DigestMessage, NewQueueEntry, OrderSummary, PaymentSummary,
    QueueEntry, Recipient, RecipientCriteria, StateCounts,
};
use crate::error::QueueServiceError;

/// Persistent queue of notification jobs.
///
/// Every state transition is a single atomic statement (or one transaction for
/// locking) so concurrent workers never observe or produce a partial change.
pub trait QueueStore: Send + Sync {
    /// Insert a `Queued` entry. Fails with `AlreadyQueued` while another
    /// `Queued` entry exists for the same (order, client).
    async fn enqueue(&self, entry: &NewQueueEntry) -> Result<JobId, QueueServiceError>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<QueueEntry>, QueueServiceError>;

    /// Distinct clients with at least one `Queued` entry on `channel`.
    async fn list_clients_with_queued_jobs(
        &self,
        channel: Channel,
    ) -> Result<Vec<ClientId>, QueueServiceError>;

    async fn job_order_ids(
        &self,
        ids: &[JobId],
    ) -> Result<HashMap<JobId, OrderId>, QueueServiceError>;

    /// Move every `Queued` entry of the client on `channel` to `Locked`,
    /// incrementing `lock_count`. Entries claimed concurrently by another
    /// worker are not returned.
    async fn lock_client_jobs(
        &self,
        client_id: ClientId,
        channel: Channel,
    ) -> Result<Vec<JobId>, QueueServiceError>;

    /// Move `Locked` entries that have a newer pending twin for the same
    /// (order, client) to `Skipped`.
    async fn skip_superseded_locks(
        &self,
        channel: Channel,
    ) -> Result<Vec<JobId>, QueueServiceError>;

    /// Move `Locked` entries with `lock_count < max_lock_count` back to `Queued`.
    async fn reclaim_stale_locks(
        &self,
        channel: Channel,
        max_lock_count: i32,
    ) -> Result<Vec<JobId>, QueueServiceError>;

    /// Move `Locked` entries with `lock_count >= max_lock_count` to `Failed`.
    async fn fail_stale_locks(
        &self,
        channel: Channel,
        max_lock_count: i32,
    ) -> Result<Vec<JobId>, QueueServiceError>;

    /// Set a terminal state on the listed non-terminal entries. Entries that
    /// are already terminal are left untouched. Returns the number changed.
    async fn finalize(
        &self,
        ids: &[JobId],
        state: TerminalState,
    ) -> Result<u64, QueueServiceError>;

    async fn count_by_state(&self, channel: Channel) -> Result<StateCounts, QueueServiceError>;
}

/// Order contact lookups.
pub trait RecipientPort: Send + Sync {
    async fn curators_for_orders(
        &self,
        order_ids: &[OrderId],
        role: ContactRole,
    ) -> Result<Vec<CuratorLink>, QueueServiceError>;

    /// Client-wide accounting contacts, interested in every order of the client.
    async fn client_level_recipients(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<RecipientId>, QueueServiceError>;
}

/// Recipient eligibility filter.
pub trait EligibilityPort: Send + Sync {
    async fn filter(
        &self,
        criteria: &RecipientCriteria,
    ) -> Result<Vec<Recipient>, QueueServiceError>;
}

/// Order and payment data used to render digest lines.
pub trait OrderDataPort: Send + Sync {
    async fn load_orders(
        &self,
        ids: &[OrderId],
    ) -> Result<HashMap<OrderId, OrderSummary>, QueueServiceError>;

    async fn load_payments(
        &self,
        ids: &[OrderId],
    ) -> Result<HashMap<OrderId, PaymentSummary>, QueueServiceError>;
}

/// Outbound message sink.
pub trait MessageDispatcher: Send + Sync {
    async fn send(&self, message: &DigestMessage) -> Result<(), QueueServiceError>;
}
