//! In-memory execution repository, for tests and embedders that do not
//! need durability. Semantics match `SqliteExecutionStore`, including the
//! compare-and-swap conflict behavior.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::EngineError;
use crate::models::{ExecutionStatus, ExecutionStep, WorkflowExecution};

use super::execution_store::ExecutionRepository;

#[derive(Default)]
struct Inner {
    executions: HashMap<String, WorkflowExecution>,
    steps: HashMap<String, BTreeMap<usize, ExecutionStep>>,
}

#[derive(Clone, Default)]
pub struct MemoryExecutionStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, EngineError> {
        self.inner
            .lock()
            .map_err(|e| EngineError::Internal(format!("Lock poisoned: {}", e)))
    }
}

#[async_trait]
impl ExecutionRepository for MemoryExecutionStore {
    async fn insert(&self, execution: &WorkflowExecution) -> Result<(), EngineError> {
        let mut inner = self.lock()?;
        if inner.executions.contains_key(&execution.id) {
            return Err(EngineError::Database(format!(
                "execution {} already inserted",
                execution.id
            )));
        }
        inner
            .executions
            .insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn get(&self, execution_id: &str) -> Result<Option<WorkflowExecution>, EngineError> {
        Ok(self.lock()?.executions.get(execution_id).cloned())
    }

    async fn compare_and_swap(
        &self,
        execution_id: &str,
        expected: ExecutionStatus,
        new_state: &WorkflowExecution,
    ) -> Result<(), EngineError> {
        let mut inner = self.lock()?;
        let current = inner.executions.get_mut(execution_id).ok_or_else(|| {
            EngineError::NotFound(format!("Execution {} not found", execution_id))
        })?;
        if current.status != expected {
            return Err(EngineError::Conflict(format!(
                "execution {} is '{}' (expected '{}')",
                execution_id,
                current.status.as_str(),
                expected.as_str()
            )));
        }
        *current = new_state.clone();
        Ok(())
    }

    async fn upsert_step(&self, step: &ExecutionStep) -> Result<(), EngineError> {
        let mut inner = self.lock()?;
        inner
            .steps
            .entry(step.execution_id.clone())
            .or_default()
            .insert(step.step_order, step.clone());
        Ok(())
    }

    async fn list_steps(&self, execution_id: &str) -> Result<Vec<ExecutionStep>, EngineError> {
        Ok(self
            .lock()?
            .steps
            .get(execution_id)
            .map(|steps| steps.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution(id: &str) -> WorkflowExecution {
        WorkflowExecution::new(
            id.to_string(),
            "t1".to_string(),
            "default".to_string(),
            serde_json::json!({}),
        )
    }

    #[tokio::test]
    async fn test_cas_succeeds_only_from_expected_status() {
        let store = MemoryExecutionStore::new();
        let mut e = execution("e1");
        store.insert(&e).await.unwrap();

        e.status = ExecutionStatus::StepRunning;
        store
            .compare_and_swap("e1", ExecutionStatus::Running, &e)
            .await
            .unwrap();

        // The marker is now held; a second swap from `running` conflicts.
        let err = store
            .compare_and_swap("e1", ExecutionStatus::Running, &e)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_cas_on_missing_execution_is_not_found() {
        let store = MemoryExecutionStore::new();
        let e = execution("ghost");
        let err = store
            .compare_and_swap("ghost", ExecutionStatus::Running, &e)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upsert_step_overwrites_same_index() {
        let store = MemoryExecutionStore::new();
        let mut step = ExecutionStep::pending("e1".to_string(), 0);
        store.upsert_step(&step).await.unwrap();

        step.status = crate::models::StepStatus::Completed;
        store.upsert_step(&step).await.unwrap();

        let steps = store.list_steps("e1").await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, crate::models::StepStatus::Completed);
    }
}
