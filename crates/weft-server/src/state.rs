//! Shared application state for the axum server.

use std::sync::Arc;

use weft_core::agent::AgentRegistry;
use weft_core::db::Database;
use weft_core::engine::ExecutionEngine;
use weft_core::store::{ExecutionRepository, SqliteExecutionStore, TemplateStore};

/// Shared state accessible by all API handlers.
pub struct AppStateInner {
    pub db: Database,
    pub template_store: TemplateStore,
    pub engine: ExecutionEngine,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(db: Database, registry: Arc<AgentRegistry>) -> Self {
        let template_store = TemplateStore::new(db.clone());
        let repository: Arc<dyn ExecutionRepository> =
            Arc::new(SqliteExecutionStore::new(db.clone()));
        let engine = ExecutionEngine::new(template_store.clone(), repository, registry);
        Self {
            db,
            template_store,
            engine,
        }
    }
}
