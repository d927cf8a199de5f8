use sea_orm::DatabaseConnection;

use crate::domain::types::LockThreshold;
use crate::infra::db::{DbOutboxDispatcher, DbQueueStore};
use crate::infra::http::HttpDirectoryClient;
use crate::usecase::orchestrator::QueueOrchestrator;

/// Orchestrator wired to Postgres and the directory service.
pub type DbQueueOrchestrator = QueueOrchestrator<
    DbQueueStore,
    HttpDirectoryClient,
    HttpDirectoryClient,
    HttpDirectoryClient,
    DbOutboxDispatcher,
>;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
}

impl AppState {
    pub fn queue_store(&self) -> DbQueueStore {
        DbQueueStore {
            db: self.db.clone(),
        }
    }

    pub fn orchestrator(
        &self,
        directory: HttpDirectoryClient,
        threshold: LockThreshold,
    ) -> DbQueueOrchestrator {
        QueueOrchestrator::new(
            self.queue_store(),
            directory.clone(),
            directory.clone(),
            directory,
            DbOutboxDispatcher {
                db: self.db.clone(),
            },
            threshold,
        )
    }
}
