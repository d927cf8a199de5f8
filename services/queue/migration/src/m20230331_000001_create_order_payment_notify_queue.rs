use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::ConnectionTrait;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Enforced by the database so concurrent producers cannot queue the same pair twice.
const UNIQUE_QUEUED_INDEX: &str = "uq_order_payment_notify_queue_order_id_client_id_queued";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OrderPaymentNotifyQueue::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrderPaymentNotifyQueue::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OrderPaymentNotifyQueue::OrderId).big_integer().not_null())
                    .col(ColumnDef::new(OrderPaymentNotifyQueue::ClientId).big_integer().not_null())
                    .col(
                        ColumnDef::new(OrderPaymentNotifyQueue::Channel)
                            .text()
                            .not_null()
                            .default("consignor-expeditor"),
                    )
                    .col(
                        ColumnDef::new(OrderPaymentNotifyQueue::State)
                            .char_len(1)
                            .not_null()
                            .default("Q"),
                    )
                    .col(
                        ColumnDef::new(OrderPaymentNotifyQueue::LockCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(OrderPaymentNotifyQueue::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(OrderPaymentNotifyQueue::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        for (column, name) in [
            (OrderPaymentNotifyQueue::OrderId, "idx_order_payment_notify_queue_order_id"),
            (OrderPaymentNotifyQueue::ClientId, "idx_order_payment_notify_queue_client_id"),
            (OrderPaymentNotifyQueue::State, "idx_order_payment_notify_queue_state"),
            (OrderPaymentNotifyQueue::Channel, "idx_order_payment_notify_queue_channel"),
        ] {
            manager
                .create_index(
                    Index::create()
                        .table(OrderPaymentNotifyQueue::Table)
                        .col(column)
                        .name(name)
                        .to_owned(),
                )
                .await?;
        }

        // sea-query has no portable partial index builder.
        manager
            .get_connection()
            .execute_unprepared(&format!(
                "CREATE UNIQUE INDEX {UNIQUE_QUEUED_INDEX} \
                 ON order_payment_notify_queue (order_id, client_id) WHERE state = 'Q'"
            ))
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OrderPaymentNotifyQueue::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum OrderPaymentNotifyQueue {
    Table,
    Id,
    OrderId,
    ClientId,
    Channel,
    State,
    LockCount,
    CreatedAt,
    UpdatedAt,
}
