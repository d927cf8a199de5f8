use sea_orm::Database;
use tracing::{error, info};

use paynotify_core::tracing::init_tracing;
use paynotify_queue::config::QueueConfig;
use paynotify_queue::domain::types::LockThreshold;
use paynotify_queue::infra::http::HttpDirectoryClient;
use paynotify_queue::router::build_router;
use paynotify_queue::state::AppState;
use paynotify_queue::worker;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = QueueConfig::from_env();
    let threshold = LockThreshold::new(config.max_lock_count).expect("QUEUE_MAX_LOCK_COUNT");

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    let state = AppState { db };

    // Health endpoints
    let router = build_router(state.clone());
    let http_addr = format!("0.0.0.0:{}", config.queue_port);
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .expect("failed to bind");
    info!("queue worker health endpoints listening on {http_addr}");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "health server stopped");
        }
    });

    let directory = HttpDirectoryClient::new(&config.directory_url);
    let orchestrator = state.orchestrator(directory, threshold);
    worker::run(&orchestrator, &config.schedule(), shutdown_signal()).await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
