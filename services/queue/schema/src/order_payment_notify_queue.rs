use sea_orm::entity::prelude::*;

/// One pending or processed payment digest obligation for an (order, client, channel) tuple.
///
/// `state` holds a single-character code (`Q`, `L`, `T`, `F`, `S`) and `channel`
/// the channel code; both are mapped to domain enums in the service's `infra/db.rs`.
/// At most one row per `(order_id, client_id)` may be in state `Q` (partial unique index).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "order_payment_notify_queue")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub order_id: i64,
    pub client_id: i64,
    pub channel: String,
    pub state: String,
    pub lock_count: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
