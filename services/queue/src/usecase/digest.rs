use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use tracing::{debug, info};

use paynotify_domain::channel::Channel;
use paynotify_domain::id::{ClientId, JobId, OrderId, RecipientId, join_ids};

use crate::domain::repository::{
    EligibilityPort, MessageDispatcher, OrderDataPort, QueueStore, RecipientPort,
};
use crate::domain::types::{
    ChannelProfile, DigestLine, DigestMessage, DigestOutcome, DigestPayload,
};
use crate::error::QueueServiceError;

// ── Digest resolver ──────────────────────────────────────────────────────────

/// Turns one client's locked batch into per-recipient digest messages.
///
/// A recipient interested in several orders of the batch receives exactly one
/// message listing all of them.
pub struct DigestResolver<S, R, E, O, D>
where
    S: QueueStore,
    R: RecipientPort,
    E: EligibilityPort,
    O: OrderDataPort,
    D: MessageDispatcher,
{
    pub store: S,
    pub recipients: R,
    pub eligibility: E,
    pub orders: O,
    pub dispatcher: D,
}

impl<S, R, E, O, D> DigestResolver<S, R, E, O, D>
where
    S: QueueStore,
    R: RecipientPort,
    E: EligibilityPort,
    O: OrderDataPort,
    D: MessageDispatcher,
{
    /// Interested recipients per order. Client-level contacts are added to every order.
    pub async fn recipients_by_order(
        &self,
        channel: Channel,
        client_id: ClientId,
        order_ids: &[OrderId],
    ) -> Result<BTreeMap<OrderId, BTreeSet<RecipientId>>, QueueServiceError> {
        let profile = ChannelProfile::for_channel(channel);
        let curators = self
            .recipients
            .curators_for_orders(order_ids, profile.contact_role)
            .await?;
        let client_level = self.recipients.client_level_recipients(client_id).await?;

        let mut by_order: BTreeMap<OrderId, BTreeSet<RecipientId>> = order_ids
            .iter()
            .map(|order_id| (*order_id, client_level.iter().copied().collect()))
            .collect();
        for link in curators {
            if let Some(recipients) = by_order.get_mut(&link.order_id) {
                recipients.insert(link.recipient_id);
            }
        }
        Ok(by_order)
    }

    /// Build and send the digests for `job_ids`, all belonging to `client_id`.
    pub async fn deliver(
        &self,
        channel: Channel,
        client_id: ClientId,
        job_ids: &[JobId],
    ) -> Result<DigestOutcome, QueueServiceError> {
        let order_ids = self.batch_order_ids(job_ids).await?;
        if order_ids.is_empty() {
            return Ok(DigestOutcome::default());
        }

        let by_order = self
            .recipients_by_order(channel, client_id, &order_ids)
            .await?;
        let orders_by_recipient = invert(&by_order);

        let profile = ChannelProfile::for_channel(channel);
        let candidates: Vec<RecipientId> = orders_by_recipient.keys().copied().collect();
        let mut eligible = self
            .eligibility
            .filter(&profile.recipient_criteria(candidates))
            .await?;
        eligible.retain(|r| orders_by_recipient.contains_key(&r.id));
        eligible.sort_by_key(|r| r.id);
        eligible.dedup_by_key(|r| r.id);

        let excluded_recipients = orders_by_recipient.len() - eligible.len();
        if excluded_recipients > 0 {
            debug!(
                client_id = %client_id,
                excluded = excluded_recipients,
                "recipients filtered out by eligibility"
            );
        }

        let (lines, orders_without_data) = self.load_lines(&order_ids).await?;

        let mut batch = job_ids.to_vec();
        batch.sort();
        batch.dedup();
        let generated_at = Utc::now();
        let mut outcome = DigestOutcome {
            excluded_recipients,
            orders_without_data,
            ..Default::default()
        };
        for recipient in eligible {
            let Some(recipient_orders) = orders_by_recipient.get(&recipient.id) else {
                continue;
            };
            let orders: Vec<DigestLine> = recipient_orders
                .iter()
                .filter_map(|order_id| lines.get(order_id).cloned())
                .collect();
            if orders.is_empty() {
                debug!(recipient_id = %recipient.id, "no renderable orders for recipient");
                continue;
            }

            let message = DigestMessage {
                batch: batch.clone(),
                recipient,
                template: profile.template,
                skip_filter: true,
                payload: DigestPayload {
                    orders,
                    generated_at,
                },
            };
            self.dispatcher.send(&message).await?;
            outcome.messages += 1;
        }
        Ok(outcome)
    }

    /// Distinct order ids of the batch, in job order.
    async fn batch_order_ids(&self, job_ids: &[JobId]) -> Result<Vec<OrderId>, QueueServiceError> {
        if job_ids.is_empty() {
            return Ok(Vec::new());
        }
        let by_job = self.store.job_order_ids(job_ids).await?;
        let mut seen = BTreeSet::new();
        Ok(job_ids
            .iter()
            .filter_map(|job_id| by_job.get(job_id).copied())
            .filter(|order_id| seen.insert(*order_id))
            .collect())
    }

    /// Digest lines for every order with both order and payment data.
    async fn load_lines(
        &self,
        order_ids: &[OrderId],
    ) -> Result<(HashMap<OrderId, DigestLine>, Vec<OrderId>), QueueServiceError> {
        let orders = self.orders.load_orders(order_ids).await?;
        let payments = self.orders.load_payments(order_ids).await?;

        let mut lines = HashMap::with_capacity(order_ids.len());
        let mut missing = Vec::new();
        for order_id in order_ids {
            match (orders.get(order_id), payments.get(order_id)) {
                (Some(order), Some(payment)) => {
                    lines.insert(*order_id, DigestLine::extract(order, payment));
                }
                _ => missing.push(*order_id),
            }
        }
        if !missing.is_empty() {
            info!(order_ids = %join_ids(&missing), "order or payment data missing, skipped");
        }
        Ok((lines, missing))
    }
}

/// Recipient to the orders they are interested in.
fn invert(
    by_order: &BTreeMap<OrderId, BTreeSet<RecipientId>>,
) -> BTreeMap<RecipientId, BTreeSet<OrderId>> {
    let mut by_recipient: BTreeMap<RecipientId, BTreeSet<OrderId>> = BTreeMap::new();
    for (order_id, recipients) in by_order {
        for recipient_id in recipients {
            by_recipient.entry(*recipient_id).or_default().insert(*order_id);
        }
    }
    by_recipient
}
