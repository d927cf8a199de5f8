pub use sea_orm_migration::prelude::*;

mod m20230331_000001_create_order_payment_notify_queue;
mod m20230331_000002_create_digest_outbox;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20230331_000001_create_order_payment_notify_queue::Migration),
            Box::new(m20230331_000002_create_digest_outbox::Migration),
        ]
    }
}
