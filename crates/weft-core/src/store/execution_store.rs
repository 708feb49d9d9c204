//! Execution repository — durable storage for execution and step records.
//!
//! The repository contract is the concurrency boundary of the engine: every
//! status change goes through `compare_and_swap`, a guarded update keyed on
//! the current status. Whoever wins the swap into the internal
//! `step_running` marker owns the execution until they swap it back out;
//! everyone else observes a conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};
use serde_json::Value;

use crate::db::Database;
use crate::error::EngineError;
use crate::models::{ExecutionStatus, ExecutionStep, StepStatus, WorkflowExecution};

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Persist a freshly started execution.
    async fn insert(&self, execution: &WorkflowExecution) -> Result<(), EngineError>;

    async fn get(&self, execution_id: &str) -> Result<Option<WorkflowExecution>, EngineError>;

    /// Write `new_state` only if the stored status still equals `expected`;
    /// otherwise fail with `Conflict` (or `NotFound`) and change nothing.
    async fn compare_and_swap(
        &self,
        execution_id: &str,
        expected: ExecutionStatus,
        new_state: &WorkflowExecution,
    ) -> Result<(), EngineError>;

    /// Insert or update the record for one step index. Re-attempts after a
    /// pause overwrite the same record.
    async fn upsert_step(&self, step: &ExecutionStep) -> Result<(), EngineError>;

    async fn list_steps(&self, execution_id: &str) -> Result<Vec<ExecutionStep>, EngineError>;
}

/// Production repository backed by SQLite.
#[derive(Clone)]
pub struct SqliteExecutionStore {
    db: Database,
}

impl SqliteExecutionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ExecutionRepository for SqliteExecutionStore {
    async fn insert(&self, execution: &WorkflowExecution) -> Result<(), EngineError> {
        let e = execution.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO workflow_executions
                     (id, template_id, owner_id, status, current_step_order, accumulated_context,
                      error_message, started_at, paused_at, completed_at, failed_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    rusqlite::params![
                        e.id,
                        e.template_id,
                        e.owner_id,
                        e.status.as_str(),
                        e.current_step_order as i64,
                        serde_json::to_string(&e.accumulated_context)
                            .unwrap_or_else(|_| "{}".to_string()),
                        e.error_message,
                        e.started_at.timestamp_millis(),
                        e.paused_at.map(|t| t.timestamp_millis()),
                        e.completed_at.map(|t| t.timestamp_millis()),
                        e.failed_at.map(|t| t.timestamp_millis()),
                        e.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn get(&self, execution_id: &str) -> Result<Option<WorkflowExecution>, EngineError> {
        let id = execution_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, template_id, owner_id, status, current_step_order,
                            accumulated_context, error_message, started_at, paused_at,
                            completed_at, failed_at, updated_at
                     FROM workflow_executions WHERE id = ?1",
                )?;
                stmt.query_row(rusqlite::params![id], row_to_execution).optional()
            })
            .await
    }

    async fn compare_and_swap(
        &self,
        execution_id: &str,
        expected: ExecutionStatus,
        new_state: &WorkflowExecution,
    ) -> Result<(), EngineError> {
        let id = execution_id.to_string();
        let e = new_state.clone();
        let changed = self
            .db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE workflow_executions SET
                        status = ?1,
                        current_step_order = ?2,
                        accumulated_context = ?3,
                        error_message = ?4,
                        paused_at = ?5,
                        completed_at = ?6,
                        failed_at = ?7,
                        updated_at = ?8
                     WHERE id = ?9 AND status = ?10",
                    rusqlite::params![
                        e.status.as_str(),
                        e.current_step_order as i64,
                        serde_json::to_string(&e.accumulated_context)
                            .unwrap_or_else(|_| "{}".to_string()),
                        e.error_message,
                        e.paused_at.map(|t| t.timestamp_millis()),
                        e.completed_at.map(|t| t.timestamp_millis()),
                        e.failed_at.map(|t| t.timestamp_millis()),
                        e.updated_at.timestamp_millis(),
                        id,
                        expected.as_str(),
                    ],
                )
            })
            .await?;

        if changed == 1 {
            return Ok(());
        }
        match self.get(execution_id).await? {
            None => Err(EngineError::NotFound(format!(
                "Execution {} not found",
                execution_id
            ))),
            Some(current) => Err(EngineError::Conflict(format!(
                "execution {} is '{}' (expected '{}')",
                execution_id,
                current.status.as_str(),
                expected.as_str()
            ))),
        }
    }

    async fn upsert_step(&self, step: &ExecutionStep) -> Result<(), EngineError> {
        let s = step.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO workflow_execution_steps
                     (execution_id, step_order, status, agent_input, agent_output, user_input,
                      error_message, started_at, completed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(execution_id, step_order) DO UPDATE SET
                       status = excluded.status,
                       agent_input = excluded.agent_input,
                       agent_output = excluded.agent_output,
                       user_input = excluded.user_input,
                       error_message = excluded.error_message,
                       started_at = excluded.started_at,
                       completed_at = excluded.completed_at",
                    rusqlite::params![
                        s.execution_id,
                        s.step_order as i64,
                        s.status.as_str(),
                        s.agent_input.as_ref().map(value_to_text),
                        s.agent_output.as_ref().map(value_to_text),
                        s.user_input.as_ref().map(value_to_text),
                        s.error_message,
                        s.started_at.map(|t| t.timestamp_millis()),
                        s.completed_at.map(|t| t.timestamp_millis()),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn list_steps(&self, execution_id: &str) -> Result<Vec<ExecutionStep>, EngineError> {
        let id = execution_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT execution_id, step_order, status, agent_input, agent_output,
                            user_input, error_message, started_at, completed_at
                     FROM workflow_execution_steps
                     WHERE execution_id = ?1 ORDER BY step_order ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![id], row_to_step)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

fn value_to_text(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn parse_json(text: Option<String>) -> Option<Value> {
    text.and_then(|s| serde_json::from_str(&s).ok())
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn row_to_execution(row: &Row<'_>) -> rusqlite::Result<WorkflowExecution> {
    let status_str: String = row.get(3)?;
    let status = ExecutionStatus::from_str(&status_str)
        .ok_or_else(|| conversion_error(3, format!("unknown execution status '{}'", status_str)))?;
    let context_str: String = row.get(5)?;

    Ok(WorkflowExecution {
        id: row.get(0)?,
        template_id: row.get(1)?,
        owner_id: row.get(2)?,
        status,
        current_step_order: row.get::<_, i64>(4)? as usize,
        accumulated_context: serde_json::from_str(&context_str)
            .unwrap_or_else(|_| serde_json::json!({})),
        error_message: row.get(6)?,
        started_at: millis_to_datetime(row.get(7)?),
        paused_at: row.get::<_, Option<i64>>(8)?.map(millis_to_datetime),
        completed_at: row.get::<_, Option<i64>>(9)?.map(millis_to_datetime),
        failed_at: row.get::<_, Option<i64>>(10)?.map(millis_to_datetime),
        updated_at: millis_to_datetime(row.get(11)?),
    })
}

fn row_to_step(row: &Row<'_>) -> rusqlite::Result<ExecutionStep> {
    let status_str: String = row.get(2)?;
    let status = StepStatus::from_str(&status_str)
        .ok_or_else(|| conversion_error(2, format!("unknown step status '{}'", status_str)))?;

    Ok(ExecutionStep {
        execution_id: row.get(0)?,
        step_order: row.get::<_, i64>(1)? as usize,
        status,
        agent_input: parse_json(row.get(3)?),
        agent_output: parse_json(row.get(4)?),
        user_input: parse_json(row.get(5)?),
        error_message: row.get(6)?,
        started_at: row.get::<_, Option<i64>>(7)?.map(millis_to_datetime),
        completed_at: row.get::<_, Option<i64>>(8)?.map(millis_to_datetime),
    })
}
