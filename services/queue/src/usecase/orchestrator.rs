use tracing::{Instrument as _, error, info, info_span};

use paynotify_domain::channel::Channel;
use paynotify_domain::id::{ClientId, JobId, join_ids};
use paynotify_domain::state::TerminalState;

use crate::domain::repository::{
    EligibilityPort, MessageDispatcher, OrderDataPort, QueueStore, RecipientPort,
};
use crate::domain::types::{DeliveryReport, LockThreshold, MaintenanceReport};
use crate::error::QueueServiceError;
use crate::usecase::digest::DigestResolver;
use crate::usecase::lease::LeaseManager;

/// The two periodic entry points of the queue: maintenance and delivery.
pub struct QueueOrchestrator<S, R, E, O, D>
where
    S: QueueStore,
    R: RecipientPort,
    E: EligibilityPort,
    O: OrderDataPort,
    D: MessageDispatcher,
{
    pub lease: LeaseManager<S>,
    pub digest: DigestResolver<S, R, E, O, D>,
}

impl<S, R, E, O, D> QueueOrchestrator<S, R, E, O, D>
where
    S: QueueStore + Clone,
    R: RecipientPort,
    E: EligibilityPort,
    O: OrderDataPort,
    D: MessageDispatcher,
{
    pub fn new(
        store: S,
        recipients: R,
        eligibility: E,
        orders: O,
        dispatcher: D,
        threshold: LockThreshold,
    ) -> Self {
        Self {
            lease: LeaseManager {
                store: store.clone(),
                threshold,
            },
            digest: DigestResolver {
                store,
                recipients,
                eligibility,
                orders,
                dispatcher,
            },
        }
    }

    /// Recover abandoned locks: requeue those below the threshold, fail the rest.
    pub async fn manage_queue(
        &self,
        channel: Channel,
    ) -> Result<MaintenanceReport, QueueServiceError> {
        let report = self
            .lease
            .maintain(channel)
            .instrument(info_span!("manage_queue", channel = %channel))
            .await?;
        info!(
            channel = %channel,
            superseded = report.superseded.len(),
            reclaimed = report.reclaimed.len(),
            failed = report.failed.len(),
            "queue maintenance finished"
        );
        Ok(report)
    }

    /// Deliver digests for every client with queued jobs on `channel`.
    ///
    /// A failure for one client is logged and leaves that client's jobs
    /// `Locked` for the next maintenance pass; other clients still proceed.
    pub async fn send_messages(
        &self,
        channel: Channel,
    ) -> Result<DeliveryReport, QueueServiceError> {
        let clients = self
            .lease
            .store
            .list_clients_with_queued_jobs(channel)
            .await?;

        let mut report = DeliveryReport {
            clients: clients.len(),
            ..Default::default()
        };
        for client_id in clients {
            let span = info_span!("deliver_client", channel = %channel, client_id = %client_id);
            match self.deliver_client(channel, client_id).instrument(span).await {
                Ok(None) => report.empty_clients += 1,
                Ok(Some((job_ids, messages))) => {
                    report.messages += messages;
                    report.sent_jobs.extend(job_ids);
                }
                Err(e) => {
                    error!(
                        channel = %channel,
                        client_id = %client_id,
                        kind = e.kind(),
                        error = ?e,
                        "failed to deliver client digest, jobs stay locked"
                    );
                    report.failed_clients.push(client_id);
                }
            }
        }

        info!(
            channel = %channel,
            clients = report.clients,
            sent_jobs = report.sent_jobs.len(),
            messages = report.messages,
            failed_clients = report.failed_clients.len(),
            "digest delivery finished"
        );
        Ok(report)
    }

    /// Lock, deliver and finalize one client's batch. `None` when another
    /// worker claimed every job first.
    async fn deliver_client(
        &self,
        channel: Channel,
        client_id: ClientId,
    ) -> Result<Option<(Vec<JobId>, usize)>, QueueServiceError> {
        let job_ids = self.lease.lock_client_jobs(client_id, channel).await?;
        if job_ids.is_empty() {
            return Ok(None);
        }

        let outcome = self.digest.deliver(channel, client_id, &job_ids).await?;
        self.lease
            .store
            .finalize(&job_ids, TerminalState::Sent)
            .await?;
        info!(
            job_ids = %join_ids(&job_ids),
            messages = outcome.messages,
            "client digest delivered"
        );
        Ok(Some((job_ids, outcome.messages)))
    }
}
