use axum::{Router, extract::State, http::StatusCode, routing::get};
use tower_http::trace::TraceLayer;

use paynotify_core::health::{healthz, readiness};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Ready while the database answers a ping.
async fn readyz(State(state): State<AppState>) -> StatusCode {
    readiness(state.db.ping().await.is_ok())
}
