use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    cli::run_cli(paynotify_queue_migration::Migrator).await;
}
