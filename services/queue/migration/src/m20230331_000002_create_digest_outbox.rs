use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DigestOutbox::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DigestOutbox::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DigestOutbox::RecipientId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DigestOutbox::Template).string().not_null())
                    .col(
                        ColumnDef::new(DigestOutbox::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DigestOutbox::IdempotencyKey)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(DigestOutbox::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(DigestOutbox::ProcessedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Relay poll: unprocessed rows oldest first.
        manager
            .create_index(
                Index::create()
                    .table(DigestOutbox::Table)
                    .col(DigestOutbox::ProcessedAt)
                    .col(DigestOutbox::CreatedAt)
                    .name("idx_digest_outbox_processed_at_created_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DigestOutbox::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum DigestOutbox {
    Table,
    Id,
    RecipientId,
    Template,
    Payload,
    IdempotencyKey,
    CreatedAt,
    ProcessedAt,
}
