use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use paynotify_domain::channel::Channel;
use paynotify_domain::id::{ClientId, JobId, OrderId, RecipientId};
use paynotify_domain::state::QueueState;

use crate::error::QueueServiceError;

/// One notification obligation for an (order, client, channel) tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: JobId,
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub channel: Channel,
    pub state: QueueState,
    /// Number of times the entry entered `Locked`. Never decreases.
    pub lock_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Producer input for a new `Queued` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewQueueEntry {
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub channel: Channel,
}

/// Per-state row counts for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub queued: u64,
    pub locked: u64,
    pub sent: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl StateCounts {
    pub fn add(&mut self, state: QueueState, n: u64) {
        let slot = match state {
            QueueState::Queued => &mut self.queued,
            QueueState::Locked => &mut self.locked,
            QueueState::Sent => &mut self.sent,
            QueueState::Failed => &mut self.failed,
            QueueState::Skipped => &mut self.skipped,
        };
        *slot += n;
    }

    pub fn total(&self) -> u64 {
        self.queued + self.locked + self.sent + self.failed + self.skipped
    }
}

/// Maximum `lock_count` a `Locked` entry may reach before maintenance gives up on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockThreshold(i32);

impl LockThreshold {
    pub const DEFAULT: i32 = 3;

    pub fn new(max_lock_count: i32) -> Result<Self, QueueServiceError> {
        if max_lock_count < 1 {
            return Err(QueueServiceError::InvalidLockThreshold(max_lock_count));
        }
        Ok(Self(max_lock_count))
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl Default for LockThreshold {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

// ── Channel profiles ─────────────────────────────────────────────────────────

/// Order contact role whose curators receive a channel's digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContactRole {
    Consignor,
    GeneralContractor,
    Expeditor,
}

/// Company membership role of a recipient profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UserRole {
    Reader,
    Editor,
    Owner,
}

/// Static per-channel wiring: who is asked, which template renders the digest,
/// and which user settings opt a recipient in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelProfile {
    pub channel: Channel,
    pub contact_role: ContactRole,
    pub template: &'static str,
    pub opt_in_settings: [&'static str; 2],
}

impl ChannelProfile {
    pub fn for_channel(channel: Channel) -> Self {
        match channel {
            Channel::ConsignorToExpeditor => Self {
                channel,
                contact_role: ContactRole::Consignor,
                template: "order-consignor-to-expeditor-payment",
                opt_in_settings: [
                    "order_consignor_to_expeditor_payment_digest_email",
                    "order_consignor_to_expeditor_payment_digest_group",
                ],
            },
            Channel::GpToCarrier => Self {
                channel,
                contact_role: ContactRole::GeneralContractor,
                template: "order-gp-to-carrier-payment",
                opt_in_settings: [
                    "order_gp_to_carrier_payment_digest_email",
                    "order_gp_to_carrier_payment_digest_group",
                ],
            },
            Channel::ExpeditorToCarrier => Self {
                channel,
                contact_role: ContactRole::Expeditor,
                template: "order-expeditor-to-carrier-payment",
                opt_in_settings: [
                    "order_expeditor_to_carrier_payment_digest_email",
                    "order_expeditor_to_carrier_payment_digest_group",
                ],
            },
        }
    }

    /// Eligibility predicate for `ids`: confirmed email, member role, channel opt-in.
    pub fn recipient_criteria(&self, ids: Vec<RecipientId>) -> RecipientCriteria {
        RecipientCriteria {
            ids,
            any_confirmed_email: true,
            roles: vec![UserRole::Reader, UserRole::Editor, UserRole::Owner],
            settings: self
                .opt_in_settings
                .iter()
                .map(|key| SettingRequirement {
                    key: (*key).to_owned(),
                    value: 1,
                    include_unset: true,
                })
                .collect(),
        }
    }
}

/// A user setting that must hold `value`; `include_unset` admits users who never set it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingRequirement {
    pub key: String,
    pub value: i32,
    pub include_unset: bool,
}

/// Declarative recipient filter evaluated by the eligibility collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientCriteria {
    pub ids: Vec<RecipientId>,
    pub any_confirmed_email: bool,
    pub roles: Vec<UserRole>,
    pub settings: Vec<SettingRequirement>,
}

// ── Collaborator data ────────────────────────────────────────────────────────

/// A user profile that passed the eligibility filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub name: String,
    pub email: Option<String>,
}

/// An order curator for a given contact role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuratorLink {
    pub order_id: OrderId,
    pub recipient_id: RecipientId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub number: String,
    pub route: String,
}

/// Amounts are in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub order_id: OrderId,
    pub amount_due: i64,
    pub paid: i64,
    pub currency: String,
    pub due_date: NaiveDate,
}

// ── Digest ───────────────────────────────────────────────────────────────────

/// One order's row inside a digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestLine {
    pub order_id: OrderId,
    pub order_number: String,
    pub route: String,
    pub amount_due: i64,
    pub paid: i64,
    pub outstanding: i64,
    pub currency: String,
    pub due_date: NaiveDate,
}

impl DigestLine {
    pub fn extract(order: &OrderSummary, payment: &PaymentSummary) -> Self {
        Self {
            order_id: order.order_id,
            order_number: order.number.clone(),
            route: order.route.clone(),
            amount_due: payment.amount_due,
            paid: payment.paid,
            outstanding: (payment.amount_due - payment.paid).max(0),
            currency: payment.currency.clone(),
            due_date: payment.due_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestPayload {
    pub orders: Vec<DigestLine>,
    #[serde(serialize_with = "paynotify_core::serde::to_rfc3339_ms")]
    pub generated_at: DateTime<Utc>,
}

/// One outbound message: a single recipient, every order they care about in this batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestMessage {
    /// Locked job ids of the client's batch, ascending. A reclaimed batch
    /// comes back with the same ids, so redeliveries share one key.
    pub batch: Vec<JobId>,
    pub recipient: Recipient,
    pub template: &'static str,
    /// Eligibility was already checked; the dispatcher must not filter again.
    pub skip_filter: bool,
    pub payload: DigestPayload,
}

impl DigestMessage {
    pub fn idempotency_key(&self) -> String {
        let jobs = self
            .batch
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        format!("{}:{}:{}", self.template, self.recipient.id, jobs)
    }

    pub fn order_ids(&self) -> Vec<OrderId> {
        self.payload.orders.iter().map(|line| line.order_id).collect()
    }
}

// ── Cycle reports ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Older `Locked` twins of a newer pending entry, moved to `Skipped`.
    pub superseded: Vec<JobId>,
    /// Moved back to `Queued` for another attempt.
    pub reclaimed: Vec<JobId>,
    /// Exhausted retries, moved to `Failed`.
    pub failed: Vec<JobId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub clients: usize,
    /// Clients whose jobs were all claimed by another worker first.
    pub empty_clients: usize,
    pub sent_jobs: Vec<JobId>,
    pub failed_clients: Vec<ClientId>,
    pub messages: usize,
}

/// Result of building and dispatching one client's digests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestOutcome {
    pub messages: usize,
    pub excluded_recipients: usize,
    pub orders_without_data: Vec<OrderId>,
}
