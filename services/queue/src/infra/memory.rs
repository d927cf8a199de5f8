//! Process-local [`QueueStore`] with the same transition rules as the Postgres store.
//!
//! Every operation runs under one mutex, so each call is atomic with respect
//! to every other call.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use paynotify_domain::channel::Channel;
use paynotify_domain::id::{ClientId, JobId, OrderId};
use paynotify_domain::state::{QueueState, TerminalState};

use crate::domain::repository::QueueStore;
use crate::domain::types::{NewQueueEntry, QueueEntry, StateCounts};
use crate::error::QueueServiceError;

#[derive(Clone, Default)]
pub struct InMemoryQueueStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    last_id: i64,
    entries: BTreeMap<JobId, QueueEntry>,
}

impl Inner {
    fn has_twin(&self, entry: &QueueEntry, pred: impl Fn(&QueueEntry) -> bool) -> bool {
        self.entries.values().any(|other| {
            other.id != entry.id
                && other.order_id == entry.order_id
                && other.client_id == entry.client_id
                && pred(other)
        })
    }

    /// Move matching entries to `to`, returning their ids in ascending order.
    fn transition(&mut self, ids: &[JobId], to: QueueState) -> Vec<JobId> {
        let now = Utc::now();
        let mut moved = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.state = to;
                entry.updated_at = now;
                moved.push(*id);
            }
        }
        moved
    }

    fn locked_on(&self, channel: Channel) -> impl Iterator<Item = &QueueEntry> {
        self.entries
            .values()
            .filter(move |e| e.channel == channel && e.state == QueueState::Locked)
    }
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, Inner>, QueueServiceError> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("in-memory queue store mutex poisoned").into())
    }

    /// Every entry in id order.
    pub fn entries(&self) -> Result<Vec<QueueEntry>, QueueServiceError> {
        Ok(self.state()?.entries.values().cloned().collect())
    }
}

impl QueueStore for InMemoryQueueStore {
    async fn enqueue(&self, entry: &NewQueueEntry) -> Result<JobId, QueueServiceError> {
        let mut inner = self.state()?;
        let duplicate = inner.entries.values().any(|e| {
            e.order_id == entry.order_id
                && e.client_id == entry.client_id
                && e.state == QueueState::Queued
        });
        if duplicate {
            return Err(QueueServiceError::AlreadyQueued {
                order_id: entry.order_id,
                client_id: entry.client_id,
            });
        }

        inner.last_id += 1;
        let id = JobId(inner.last_id);
        let now = Utc::now();
        inner.entries.insert(
            id,
            QueueEntry {
                id,
                order_id: entry.order_id,
                client_id: entry.client_id,
                channel: entry.channel,
                state: QueueState::Queued,
                lock_count: 0,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<QueueEntry>, QueueServiceError> {
        Ok(self.state()?.entries.get(&id).cloned())
    }

    async fn list_clients_with_queued_jobs(
        &self,
        channel: Channel,
    ) -> Result<Vec<ClientId>, QueueServiceError> {
        let inner = self.state()?;
        let clients: BTreeSet<ClientId> = inner
            .entries
            .values()
            .filter(|e| e.channel == channel && e.state == QueueState::Queued)
            .map(|e| e.client_id)
            .collect();
        Ok(clients.into_iter().collect())
    }

    async fn job_order_ids(
        &self,
        ids: &[JobId],
    ) -> Result<HashMap<JobId, OrderId>, QueueServiceError> {
        let inner = self.state()?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.entries.get(id).map(|e| (*id, e.order_id)))
            .collect())
    }

    async fn lock_client_jobs(
        &self,
        client_id: ClientId,
        channel: Channel,
    ) -> Result<Vec<JobId>, QueueServiceError> {
        let mut inner = self.state()?;
        let now = Utc::now();
        let mut locked = Vec::new();
        for entry in inner.entries.values_mut() {
            if entry.client_id == client_id
                && entry.channel == channel
                && entry.state == QueueState::Queued
            {
                entry.state = QueueState::Locked;
                entry.lock_count += 1;
                entry.updated_at = now;
                locked.push(entry.id);
            }
        }
        Ok(locked)
    }

    async fn skip_superseded_locks(
        &self,
        channel: Channel,
    ) -> Result<Vec<JobId>, QueueServiceError> {
        let mut inner = self.state()?;
        let ids: Vec<JobId> = inner
            .locked_on(channel)
            .filter(|e| {
                inner.has_twin(e, |t| {
                    t.channel == e.channel
                        && t.id > e.id
                        && matches!(t.state, QueueState::Queued | QueueState::Locked)
                })
            })
            .map(|e| e.id)
            .collect();
        Ok(inner.transition(&ids, QueueState::Skipped))
    }

    async fn reclaim_stale_locks(
        &self,
        channel: Channel,
        max_lock_count: i32,
    ) -> Result<Vec<JobId>, QueueServiceError> {
        let mut inner = self.state()?;
        let candidates: Vec<&QueueEntry> = inner
            .locked_on(channel)
            .filter(|e| e.lock_count < max_lock_count)
            .filter(|e| !inner.has_twin(e, |t| t.state == QueueState::Queued))
            .collect();
        // newest candidate per (order, client) pair
        let mut newest: HashMap<(OrderId, ClientId), JobId> = HashMap::new();
        for e in candidates {
            let id = newest.entry((e.order_id, e.client_id)).or_insert(e.id);
            *id = (*id).max(e.id);
        }
        let mut ids: Vec<JobId> = newest.into_values().collect();
        ids.sort();
        Ok(inner.transition(&ids, QueueState::Queued))
    }

    async fn fail_stale_locks(
        &self,
        channel: Channel,
        max_lock_count: i32,
    ) -> Result<Vec<JobId>, QueueServiceError> {
        let mut inner = self.state()?;
        let ids: Vec<JobId> = inner
            .locked_on(channel)
            .filter(|e| e.lock_count >= max_lock_count)
            .map(|e| e.id)
            .collect();
        Ok(inner.transition(&ids, QueueState::Failed))
    }

    async fn finalize(
        &self,
        ids: &[JobId],
        state: TerminalState,
    ) -> Result<u64, QueueServiceError> {
        let mut inner = self.state()?;
        let pending: Vec<JobId> = ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|id| {
                inner
                    .entries
                    .get(id)
                    .is_some_and(|e| !e.state.is_terminal())
            })
            .collect();
        Ok(inner.transition(&pending, state.into()).len() as u64)
    }

    async fn count_by_state(&self, channel: Channel) -> Result<StateCounts, QueueServiceError> {
        let inner = self.state()?;
        let mut counts = StateCounts::default();
        for entry in inner.entries.values().filter(|e| e.channel == channel) {
            counts.add(entry.state, 1);
        }
        Ok(counts)
    }
}
