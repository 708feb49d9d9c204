//! SQLite database layer for the Weft engine.
//!
//! Uses rusqlite with WAL mode for concurrent read performance.
//! All database operations are executed via `tokio::task::spawn_blocking`
//! to avoid blocking the async runtime.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::EngineError;

/// Thread-safe handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(db_path: &str) -> Result<Self, EngineError> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)
            .map_err(|e| EngineError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| EngineError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;

        tracing::info!("SQLite database opened at: {}", db_path);
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EngineError::Database(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| EngineError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// Execute a closure with access to the database connection.
    /// Automatically handles locking and error conversion.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| EngineError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| EngineError::Database(e.to_string()))
    }

    /// Execute a closure with access to the database connection (async-friendly).
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| EngineError::Database(format!("Task join error: {}", e)))?
    }

    /// Create all tables if they don't exist.
    fn initialize_tables(&self) -> Result<(), EngineError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS workflow_templates (
                    id              TEXT PRIMARY KEY,
                    name            TEXT NOT NULL,
                    description     TEXT,
                    owner_id        TEXT NOT NULL,
                    visibility      TEXT NOT NULL DEFAULT 'private',
                    steps           TEXT NOT NULL DEFAULT '[]',
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_templates_owner ON workflow_templates(owner_id);

                CREATE TABLE IF NOT EXISTS workflow_executions (
                    id                  TEXT PRIMARY KEY,
                    template_id         TEXT NOT NULL REFERENCES workflow_templates(id),
                    owner_id            TEXT NOT NULL,
                    status              TEXT NOT NULL DEFAULT 'running',
                    current_step_order  INTEGER NOT NULL DEFAULT 0,
                    accumulated_context TEXT NOT NULL DEFAULT '{}',
                    error_message       TEXT,
                    started_at          INTEGER NOT NULL,
                    paused_at           INTEGER,
                    completed_at        INTEGER,
                    failed_at           INTEGER,
                    updated_at          INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_executions_template ON workflow_executions(template_id);
                CREATE INDEX IF NOT EXISTS idx_executions_owner ON workflow_executions(owner_id);
                CREATE INDEX IF NOT EXISTS idx_executions_status ON workflow_executions(status);

                CREATE TABLE IF NOT EXISTS workflow_execution_steps (
                    execution_id    TEXT NOT NULL REFERENCES workflow_executions(id) ON DELETE CASCADE,
                    step_order      INTEGER NOT NULL,
                    status          TEXT NOT NULL DEFAULT 'pending',
                    agent_input     TEXT,
                    agent_output    TEXT,
                    user_input      TEXT,
                    error_message   TEXT,
                    started_at      INTEGER,
                    completed_at    INTEGER,
                    PRIMARY KEY (execution_id, step_order)
                );
                ",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_tables_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weft.db");
        let db = Database::open(path.to_str().unwrap()).unwrap();

        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'workflow_%'",
                    [],
                    |row| row.get(0),
                )
            })
            .unwrap();
        assert_eq!(count, 3);
    }
}
