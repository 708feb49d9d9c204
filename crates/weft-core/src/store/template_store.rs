//! SQLite store for workflow templates.
//!
//! Templates are validated at creation time, and a template referenced by a
//! live (non-terminal) execution is read-only: `save` and `delete` refuse to
//! touch it until those executions finish. This is how the engine's
//! "step list frozen per execution" policy is enforced.

use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::EngineError;
use crate::models::{Visibility, WorkflowTemplate};

#[derive(Clone)]
pub struct TemplateStore {
    db: Database,
}

impl TemplateStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create or wholesale-replace a template. Rejected while any execution
    /// referencing it is still running, paused, or mid-step.
    pub async fn save(&self, template: &WorkflowTemplate) -> Result<(), EngineError> {
        template.validate()?;

        let active = self.count_executions(&template.id, true).await?;
        if active > 0 {
            return Err(EngineError::Conflict(format!(
                "template {} is referenced by {} active execution(s) and cannot be modified",
                template.id, active
            )));
        }

        let t = template.clone();
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO workflow_templates
                     (id, name, description, owner_id, visibility, steps, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(id) DO UPDATE SET
                       name = excluded.name,
                       description = excluded.description,
                       owner_id = excluded.owner_id,
                       visibility = excluded.visibility,
                       steps = excluded.steps,
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        t.id,
                        t.name,
                        t.description,
                        t.owner_id,
                        t.visibility.as_str(),
                        serde_json::to_string(&t.steps).unwrap_or_else(|_| "[]".to_string()),
                        t.created_at.timestamp_millis(),
                        now,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, template_id: &str) -> Result<Option<WorkflowTemplate>, EngineError> {
        let id = template_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, description, owner_id, visibility, steps, created_at, updated_at
                     FROM workflow_templates WHERE id = ?1",
                )?;
                stmt.query_row(rusqlite::params![id], row_to_template).optional()
            })
            .await
    }

    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<WorkflowTemplate>, EngineError> {
        let owner = owner_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, description, owner_id, visibility, steps, created_at, updated_at
                     FROM workflow_templates
                     WHERE owner_id = ?1 OR visibility = 'public'
                     ORDER BY created_at DESC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![owner], row_to_template)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Delete a template. Rejected while any execution references it, so
    /// execution history stays inspectable.
    pub async fn delete(&self, template_id: &str) -> Result<(), EngineError> {
        let referenced = self.count_executions(template_id, false).await?;
        if referenced > 0 {
            return Err(EngineError::Conflict(format!(
                "template {} is referenced by {} execution(s) and cannot be deleted",
                template_id, referenced
            )));
        }

        let id = template_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "DELETE FROM workflow_templates WHERE id = ?1",
                    rusqlite::params![id],
                )?;
                Ok(())
            })
            .await
    }

    async fn count_executions(
        &self,
        template_id: &str,
        active_only: bool,
    ) -> Result<i64, EngineError> {
        let id = template_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let sql = if active_only {
                    "SELECT COUNT(*) FROM workflow_executions
                     WHERE template_id = ?1 AND status IN ('running', 'step_running', 'paused')"
                } else {
                    "SELECT COUNT(*) FROM workflow_executions WHERE template_id = ?1"
                };
                conn.query_row(sql, rusqlite::params![id], |row| row.get(0))
            })
            .await
    }
}

fn row_to_template(row: &Row<'_>) -> rusqlite::Result<WorkflowTemplate> {
    let steps_str: String = row.get(5)?;
    let visibility_str: String = row.get(4)?;
    let created_ms: i64 = row.get(6)?;
    let updated_ms: i64 = row.get(7)?;

    Ok(WorkflowTemplate {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        owner_id: row.get(3)?,
        visibility: Visibility::from_str(&visibility_str),
        steps: serde_json::from_str(&steps_str).unwrap_or_default(),
        created_at: chrono::DateTime::from_timestamp_millis(created_ms)
            .unwrap_or_else(chrono::Utc::now),
        updated_at: chrono::DateTime::from_timestamp_millis(updated_ms)
            .unwrap_or_else(chrono::Utc::now),
    })
}
