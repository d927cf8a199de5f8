use std::collections::HashMap;

use anyhow::Context as _;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{NotSet, Set},
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult,
    QueryFilter, QueryOrder, QuerySelect, Select, SqlErr, Statement, TransactionTrait, Value,
    sea_query::{Expr, LockBehavior, LockType, OnConflict},
};
use tracing::debug;
use uuid::Uuid;

use paynotify_domain::channel::Channel;
use paynotify_domain::id::{ClientId, JobId, OrderId};
use paynotify_domain::state::{QueueState, TerminalState};
use paynotify_queue_schema::{digest_outbox, order_payment_notify_queue as queue};

use crate::domain::repository::{MessageDispatcher, QueueStore};
use crate::domain::types::{DigestMessage, NewQueueEntry, QueueEntry, StateCounts};
use crate::error::QueueServiceError;

// ── Queue store ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbQueueStore {
    pub db: DatabaseConnection,
}

/// `Queued` job ids of one client on one channel, row-locked for update.
/// Rows already locked by another transaction are skipped rather than waited on.
pub fn queued_jobs_for_client(client_id: ClientId, channel: Channel) -> Select<queue::Entity> {
    queue::Entity::find()
        .select_only()
        .column(queue::Column::Id)
        .filter(queue::Column::ClientId.eq(client_id.0))
        .filter(queue::Column::Channel.eq(channel.code()))
        .filter(queue::Column::State.eq(QueueState::Queued.code()))
        .order_by_asc(queue::Column::Id)
        .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
}

// Older Locked row of an (order, client) pair that has a newer Queued or Locked
// row on the same channel. Rows of other channels are separate notifications.
const SKIP_SUPERSEDED_SQL: &str = r#"
    UPDATE order_payment_notify_queue AS q
       SET state = $3, updated_at = now()
     WHERE q.channel = $1
       AND q.state = $2
       AND EXISTS (
           SELECT 1 FROM order_payment_notify_queue AS t
            WHERE t.order_id = q.order_id
              AND t.client_id = q.client_id
              AND t.channel = q.channel
              AND t.id > q.id
              AND t.state IN ($2, $4)
       )
    RETURNING q.id
"#;

// The unique index spans channels, so the Queued-twin guard does too. At most
// one row per pair is requeued; any older twin is superseded on the next pass.
const RECLAIM_SQL: &str = r#"
    WITH candidate AS (
        SELECT DISTINCT ON (q.order_id, q.client_id) q.id
          FROM order_payment_notify_queue AS q
         WHERE q.channel = $1
           AND q.state = $2
           AND q.lock_count < $4
           AND NOT EXISTS (
               SELECT 1 FROM order_payment_notify_queue AS t
                WHERE t.order_id = q.order_id
                  AND t.client_id = q.client_id
                  AND t.state = $3
           )
         ORDER BY q.order_id, q.client_id, q.id DESC
    )
    UPDATE order_payment_notify_queue AS u
       SET state = $3, updated_at = now()
      FROM candidate
     WHERE u.id = candidate.id
       AND u.state = $2
    RETURNING u.id
"#;

const FAIL_SQL: &str = r#"
    UPDATE order_payment_notify_queue
       SET state = $3, updated_at = now()
     WHERE channel = $1
       AND state = $2
       AND lock_count >= $4
    RETURNING id
"#;

#[derive(Debug, FromQueryResult)]
struct IdRow {
    id: i64,
}

impl DbQueueStore {
    async fn update_returning_ids(
        &self,
        sql: &str,
        values: [Value; 4],
        what: &'static str,
    ) -> Result<Vec<JobId>, QueueServiceError> {
        let rows = IdRow::find_by_statement(Statement::from_sql_and_values(
            self.db.get_database_backend(),
            sql,
            values,
        ))
        .all(&self.db)
        .await
        .context(what)?;
        let mut ids: Vec<JobId> = rows.into_iter().map(|row| JobId(row.id)).collect();
        ids.sort();
        Ok(ids)
    }
}

impl QueueStore for DbQueueStore {
    async fn enqueue(&self, entry: &NewQueueEntry) -> Result<JobId, QueueServiceError> {
        let now = Utc::now();
        let model = queue::ActiveModel {
            id: NotSet,
            order_id: Set(entry.order_id.0),
            client_id: Set(entry.client_id.0),
            channel: Set(entry.channel.code().to_owned()),
            state: Set(QueueState::Queued.code().to_owned()),
            lock_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await
        .map_err(|err| enqueue_error(err, entry))?;
        Ok(JobId(model.id))
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<QueueEntry>, QueueServiceError> {
        let model = queue::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find queue entry by id")?;
        model.map(entry_from_model).transpose()
    }

    async fn list_clients_with_queued_jobs(
        &self,
        channel: Channel,
    ) -> Result<Vec<ClientId>, QueueServiceError> {
        let ids = queue::Entity::find()
            .select_only()
            .column(queue::Column::ClientId)
            .distinct()
            .filter(queue::Column::Channel.eq(channel.code()))
            .filter(queue::Column::State.eq(QueueState::Queued.code()))
            .order_by_asc(queue::Column::ClientId)
            .into_tuple::<i64>()
            .all(&self.db)
            .await
            .context("list clients with queued jobs")?;
        Ok(ids.into_iter().map(ClientId).collect())
    }

    async fn job_order_ids(
        &self,
        ids: &[JobId],
    ) -> Result<HashMap<JobId, OrderId>, QueueServiceError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = queue::Entity::find()
            .select_only()
            .column(queue::Column::Id)
            .column(queue::Column::OrderId)
            .filter(queue::Column::Id.is_in(ids.iter().map(|id| id.0)))
            .into_tuple::<(i64, i64)>()
            .all(&self.db)
            .await
            .context("load order ids of jobs")?;
        Ok(rows
            .into_iter()
            .map(|(job_id, order_id)| (JobId(job_id), OrderId(order_id)))
            .collect())
    }

    async fn lock_client_jobs(
        &self,
        client_id: ClientId,
        channel: Channel,
    ) -> Result<Vec<JobId>, QueueServiceError> {
        let ids = self
            .db
            .transaction::<_, Vec<i64>, DbErr>(move |txn| {
                Box::pin(async move {
                    let ids = queued_jobs_for_client(client_id, channel)
                        .into_tuple::<i64>()
                        .all(txn)
                        .await?;
                    if ids.is_empty() {
                        return Ok(ids);
                    }
                    queue::Entity::update_many()
                        .col_expr(queue::Column::State, Expr::value(QueueState::Locked.code()))
                        .col_expr(
                            queue::Column::LockCount,
                            Expr::col(queue::Column::LockCount).add(1),
                        )
                        .col_expr(queue::Column::UpdatedAt, Expr::current_timestamp().into())
                        .filter(queue::Column::Id.is_in(ids.clone()))
                        .exec(txn)
                        .await?;
                    Ok(ids)
                })
            })
            .await
            .context("lock client jobs")?;
        Ok(ids.into_iter().map(JobId).collect())
    }

    async fn skip_superseded_locks(
        &self,
        channel: Channel,
    ) -> Result<Vec<JobId>, QueueServiceError> {
        self.update_returning_ids(
            SKIP_SUPERSEDED_SQL,
            [
                channel.code().into(),
                QueueState::Locked.code().into(),
                QueueState::Skipped.code().into(),
                QueueState::Queued.code().into(),
            ],
            "skip superseded locks",
        )
        .await
    }

    async fn reclaim_stale_locks(
        &self,
        channel: Channel,
        max_lock_count: i32,
    ) -> Result<Vec<JobId>, QueueServiceError> {
        self.update_returning_ids(
            RECLAIM_SQL,
            [
                channel.code().into(),
                QueueState::Locked.code().into(),
                QueueState::Queued.code().into(),
                max_lock_count.into(),
            ],
            "reclaim stale locks",
        )
        .await
    }

    async fn fail_stale_locks(
        &self,
        channel: Channel,
        max_lock_count: i32,
    ) -> Result<Vec<JobId>, QueueServiceError> {
        self.update_returning_ids(
            FAIL_SQL,
            [
                channel.code().into(),
                QueueState::Locked.code().into(),
                QueueState::Failed.code().into(),
                max_lock_count.into(),
            ],
            "fail stale locks",
        )
        .await
    }

    async fn finalize(
        &self,
        ids: &[JobId],
        state: TerminalState,
    ) -> Result<u64, QueueServiceError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = queue::Entity::update_many()
            .col_expr(queue::Column::State, Expr::value(QueueState::from(state).code()))
            .col_expr(queue::Column::UpdatedAt, Expr::current_timestamp().into())
            .filter(queue::Column::Id.is_in(ids.iter().map(|id| id.0)))
            .filter(
                queue::Column::State
                    .is_in([QueueState::Queued.code(), QueueState::Locked.code()]),
            )
            .exec(&self.db)
            .await
            .context("finalize jobs")?;
        Ok(result.rows_affected)
    }

    async fn count_by_state(&self, channel: Channel) -> Result<StateCounts, QueueServiceError> {
        let rows = queue::Entity::find()
            .select_only()
            .column(queue::Column::State)
            .column_as(Expr::col(queue::Column::Id).count(), "count")
            .filter(queue::Column::Channel.eq(channel.code()))
            .group_by(queue::Column::State)
            .into_tuple::<(String, i64)>()
            .all(&self.db)
            .await
            .context("count queue entries by state")?;

        let mut counts = StateCounts::default();
        for (code, n) in rows {
            let state = QueueState::from_code(code.trim()).context("decode state count")?;
            counts.add(state, n as u64);
        }
        Ok(counts)
    }
}

fn enqueue_error(err: DbErr, entry: &NewQueueEntry) -> QueueServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => QueueServiceError::AlreadyQueued {
            order_id: entry.order_id,
            client_id: entry.client_id,
        },
        _ => anyhow::Error::new(err).context("enqueue job").into(),
    }
}

fn entry_from_model(model: queue::Model) -> Result<QueueEntry, QueueServiceError> {
    let corrupt = |reason: String| QueueServiceError::CorruptRow {
        id: model.id,
        reason,
    };
    let channel = model
        .channel
        .parse::<Channel>()
        .map_err(|e| corrupt(e.to_string()))?;
    let state = QueueState::from_code(model.state.trim()).map_err(|e| corrupt(e.to_string()))?;
    Ok(QueueEntry {
        id: JobId(model.id),
        order_id: OrderId(model.order_id),
        client_id: ClientId(model.client_id),
        channel,
        state,
        lock_count: model.lock_count,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

// ── Outbox dispatcher ────────────────────────────────────────────────────────

/// Writes each digest into `digest_outbox` for the mail relay to pick up.
#[derive(Clone)]
pub struct DbOutboxDispatcher {
    pub db: DatabaseConnection,
}

impl MessageDispatcher for DbOutboxDispatcher {
    async fn send(&self, message: &DigestMessage) -> Result<(), QueueServiceError> {
        let payload = serde_json::to_value(message).context("serialize digest message")?;
        let key = message.idempotency_key();
        let inserted = digest_outbox::Entity::insert(digest_outbox::ActiveModel {
            id: Set(Uuid::now_v7()),
            recipient_id: Set(message.recipient.id.0),
            template: Set(message.template.to_owned()),
            payload: Set(payload),
            idempotency_key: Set(key.clone()),
            created_at: Set(Utc::now()),
            processed_at: Set(None),
        })
        .on_conflict(outbox_key_conflict())
        .exec_without_returning(&self.db)
        .await
        .context("insert digest outbox")?;
        if inserted == 0 {
            debug!(idempotency_key = %key, "digest already in outbox");
        }
        Ok(())
    }
}

/// A redelivered batch hits the unique key and is dropped.
fn outbox_key_conflict() -> OnConflict {
    OnConflict::column(digest_outbox::Column::IdempotencyKey)
        .do_nothing()
        .to_owned()
}
