//! Execution state machine — owns the lifecycle of one execution.
//!
//! ```text
//! start ──► running ──advance──► running | paused | completed | failed
//!              │  ▲                  │
//!            pause resume       submit_input (re-runs the awaiting step)
//!              ▼  │                  │
//!            paused ◄────────────────┘
//!              │
//!           cancel (also from running) ──► cancelled
//! ```
//!
//! Every status change goes through the repository's compare-and-swap, and
//! `advance`/`submit_input` hold the internal `step_running` marker for the
//! whole agent call. The marker is the unit of mutual exclusion: a second
//! operation racing an in-flight step observes a `Conflict` instead of
//! interleaving, and operations on different executions never contend.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::AgentRegistry;
use crate::engine::runner::StepRunner;
use crate::error::EngineError;
use crate::models::{
    ExecutionStatus, ExecutionStep, StepStatus, WorkflowExecution, WorkflowTemplate,
};
use crate::store::{ExecutionRepository, TemplateStore};

/// Result of one `advance`/`submit_input` call.
#[derive(Debug, Clone)]
pub struct AdvanceOutcome {
    pub execution: WorkflowExecution,
    /// True when the step just executed was the last one.
    pub completed: bool,
    /// True when the execution paused for user input.
    pub requires_user_input: bool,
}

#[derive(Clone)]
pub struct ExecutionEngine {
    templates: TemplateStore,
    executions: Arc<dyn ExecutionRepository>,
    runner: Arc<StepRunner>,
}

impl ExecutionEngine {
    pub fn new(
        templates: TemplateStore,
        executions: Arc<dyn ExecutionRepository>,
        registry: Arc<AgentRegistry>,
    ) -> Self {
        Self {
            templates,
            executions,
            runner: Arc::new(StepRunner::new(registry)),
        }
    }

    /// Start a new execution of a template at step 0.
    pub async fn start(
        &self,
        template_id: &str,
        owner_id: &str,
        initial_context: Value,
    ) -> Result<WorkflowExecution, EngineError> {
        let template = self.templates.get(template_id).await?.ok_or_else(|| {
            EngineError::NotFound(format!("Template {} not found", template_id))
        })?;
        template.validate()?;

        let initial = match initial_context {
            Value::Null => serde_json::json!({}),
            Value::Object(_) => initial_context,
            _ => {
                return Err(EngineError::Validation(
                    "initialContext must be a JSON object".to_string(),
                ))
            }
        };

        let execution = WorkflowExecution::new(
            Uuid::new_v4().to_string(),
            template.id.clone(),
            owner_id.to_string(),
            initial,
        );
        self.executions.insert(&execution).await?;

        tracing::info!(
            execution_id = %execution.id,
            template_id = %template.id,
            steps = template.steps.len(),
            "execution started"
        );
        Ok(execution.snapshot())
    }

    /// Execute the current step. The only operation that touches the agent
    /// collaborator; rejected with `Conflict` while another call is in
    /// flight for the same execution.
    pub async fn advance(
        &self,
        execution_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AdvanceOutcome, EngineError> {
        let execution = self
            .claim(execution_id, ExecutionStatus::Running, "advance")
            .await?;
        self.drive(execution, cancel).await
    }

    /// Merge user input into the paused step, then re-run it.
    pub async fn submit_input(
        &self,
        execution_id: &str,
        step_order: usize,
        user_input: Value,
        cancel: &CancellationToken,
    ) -> Result<AdvanceOutcome, EngineError> {
        let mut execution = self
            .claim(execution_id, ExecutionStatus::Paused, "submit input to")
            .await?;

        let template = match self.template_for(&execution).await {
            Ok(t) => t,
            Err(e) => return Err(self.fail_execution(execution, None, e).await),
        };

        if execution.current_step_order != step_order {
            let error = EngineError::InvalidStateTransition(format!(
                "step {} of execution {} is not awaiting input (current step is {})",
                step_order, execution_id, execution.current_step_order
            ));
            return Err(self.abort_claim_to_paused(execution, error).await);
        }
        match template.steps.get(step_order) {
            Some(step) if step.requires_user_input => {}
            _ => {
                let error = EngineError::InvalidStateTransition(format!(
                    "step {} of execution {} does not require user input",
                    step_order, execution_id
                ));
                return Err(self.abort_claim_to_paused(execution, error).await);
            }
        }

        execution.record_user_input(step_order, user_input);
        self.drive(execution, cancel).await
    }

    /// Explicit pause request.
    pub async fn pause(&self, execution_id: &str) -> Result<WorkflowExecution, EngineError> {
        self.transition(execution_id, ExecutionStatus::Running, "pause", |e| {
            let now = Utc::now();
            e.status = ExecutionStatus::Paused;
            e.paused_at = Some(now);
        })
        .await
    }

    /// Resume an explicitly paused execution. If the current step is still
    /// awaiting input, the next `advance` pauses again.
    pub async fn resume(&self, execution_id: &str) -> Result<WorkflowExecution, EngineError> {
        self.transition(execution_id, ExecutionStatus::Paused, "resume", |e| {
            e.status = ExecutionStatus::Running;
        })
        .await
    }

    /// Cancel a running or paused execution. Cancellation is cooperative:
    /// an in-flight step cannot be interrupted, so a cancel racing one is
    /// rejected with `Conflict` and must be retried once the step settles.
    pub async fn cancel(&self, execution_id: &str) -> Result<WorkflowExecution, EngineError> {
        for _ in 0..2 {
            let execution = self.require(execution_id).await?;
            match execution.status {
                ExecutionStatus::Running | ExecutionStatus::Paused => {
                    let from = execution.status;
                    let mut cancelled = execution;
                    cancelled.status = ExecutionStatus::Cancelled;
                    cancelled.updated_at = Utc::now();
                    match self
                        .executions
                        .compare_and_swap(execution_id, from, &cancelled)
                        .await
                    {
                        Ok(()) => {
                            tracing::info!(execution_id = %execution_id, "execution cancelled");
                            return Ok(cancelled.snapshot());
                        }
                        // Raced another transition; re-observe once.
                        Err(EngineError::Conflict(_)) => continue,
                        Err(e) => return Err(e),
                    }
                }
                other => return Err(self.reject(execution_id, other, "cancel")),
            }
        }
        Err(EngineError::Conflict(format!(
            "execution {} is changing status; retry cancel",
            execution_id
        )))
    }

    /// Immutable view of an execution and its step records.
    pub async fn snapshot(
        &self,
        execution_id: &str,
    ) -> Result<(WorkflowExecution, Vec<ExecutionStep>), EngineError> {
        let execution = self.require(execution_id).await?;
        let steps = self.executions.list_steps(execution_id).await?;
        Ok((execution.snapshot(), steps))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn require(&self, execution_id: &str) -> Result<WorkflowExecution, EngineError> {
        self.executions.get(execution_id).await?.ok_or_else(|| {
            EngineError::NotFound(format!("Execution {} not found", execution_id))
        })
    }

    async fn template_for(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<WorkflowTemplate, EngineError> {
        self.templates
            .get(&execution.template_id)
            .await?
            .ok_or_else(|| {
                EngineError::Internal(format!(
                    "template {} referenced by execution {} is missing",
                    execution.template_id, execution.id
                ))
            })
    }

    /// Take the in-flight marker: CAS `from → step_running`.
    async fn claim(
        &self,
        execution_id: &str,
        from: ExecutionStatus,
        operation: &str,
    ) -> Result<WorkflowExecution, EngineError> {
        self.transition(execution_id, from, operation, |e| {
            e.status = ExecutionStatus::StepRunning;
        })
        .await
    }

    /// Single guarded status transition. The observed status must equal
    /// `from` both before and at the swap; a lost race is reported against
    /// the status that won.
    async fn transition(
        &self,
        execution_id: &str,
        from: ExecutionStatus,
        operation: &str,
        apply: impl FnOnce(&mut WorkflowExecution),
    ) -> Result<WorkflowExecution, EngineError> {
        let execution = self.require(execution_id).await?;
        if execution.status != from {
            return Err(self.reject(execution_id, execution.status, operation));
        }

        let mut next = execution;
        apply(&mut next);
        next.updated_at = Utc::now();

        match self
            .executions
            .compare_and_swap(execution_id, from, &next)
            .await
        {
            Ok(()) => Ok(next),
            Err(EngineError::Conflict(_)) => {
                let current = self
                    .require(execution_id)
                    .await
                    .map(|e| e.status)
                    .unwrap_or(from);
                Err(self.reject(execution_id, current, operation))
            }
            Err(e) => Err(e),
        }
    }

    fn reject(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        operation: &str,
    ) -> EngineError {
        match status {
            ExecutionStatus::StepRunning => EngineError::Conflict(format!(
                "a step is in flight for execution {}; retry once it settles",
                execution_id
            )),
            other => EngineError::InvalidStateTransition(format!(
                "cannot {} execution {} while it is '{}'",
                operation,
                execution_id,
                other.as_str()
            )),
        }
    }

    /// Run the current step of a claimed execution and settle the outcome.
    /// Precondition: the stored status is `step_running` and we put it there.
    async fn drive(
        &self,
        mut execution: WorkflowExecution,
        cancel: &CancellationToken,
    ) -> Result<AdvanceOutcome, EngineError> {
        let template = match self.template_for(&execution).await {
            Ok(t) => t,
            Err(e) => return Err(self.fail_execution(execution, None, e).await),
        };

        let step_index = execution.current_step_order;
        let step = match template.steps.get(step_index) {
            Some(step) => step.clone(),
            None => {
                let e = EngineError::Internal(format!(
                    "execution {} points past the last step",
                    execution.id
                ));
                return Err(self.fail_execution(execution, None, e).await);
            }
        };

        // Input is collected before the agent call of the same step, so the
        // step's own prompt can reference {{stepN.userInput}}.
        if StepRunner::awaits_input(&step, &execution) {
            return self.pause_for_input(execution, step_index).await;
        }

        let mut record = ExecutionStep::pending(execution.id.clone(), step_index);
        record.status = StepStatus::Running;
        record.user_input = execution.user_input(step_index).cloned();
        record.started_at = Some(Utc::now());
        if let Err(e) = self.executions.upsert_step(&record).await {
            return Err(self.fail_execution(execution, None, e).await);
        }

        match self.runner.run(&step, &execution, cancel).await {
            Ok(done) => {
                record.status = StepStatus::Completed;
                record.agent_input = Some(done.agent_input);
                record.agent_output = Some(done.output.clone());
                record.completed_at = Some(Utc::now());
                if let Err(e) = self.executions.upsert_step(&record).await {
                    return Err(self.fail_execution(execution, None, e).await);
                }

                execution.record_step_output(step_index, done.output);
                execution.current_step_order = step_index + 1;
                self.settle(execution, &template).await
            }
            Err(error) => {
                record.status = StepStatus::Failed;
                record.error_message = Some(error.to_string());
                record.completed_at = Some(Utc::now());
                Err(self.fail_execution(execution, Some(record), error).await)
            }
        }
    }

    /// After a completed step: finish, pause for the next step's input, or
    /// hand the execution back in `running` for the next `advance`.
    async fn settle(
        &self,
        mut execution: WorkflowExecution,
        template: &WorkflowTemplate,
    ) -> Result<AdvanceOutcome, EngineError> {
        let now = Utc::now();
        execution.updated_at = now;

        if execution.current_step_order == template.steps.len() {
            execution.status = ExecutionStatus::Completed;
            execution.completed_at = Some(now);
            self.release(&execution).await?;
            tracing::info!(execution_id = %execution.id, "execution completed");
            return Ok(AdvanceOutcome {
                execution: execution.snapshot(),
                completed: true,
                requires_user_input: false,
            });
        }

        if template.steps[execution.current_step_order].requires_user_input {
            let next_index = execution.current_step_order;
            return self.pause_for_input(execution, next_index).await;
        }

        execution.status = ExecutionStatus::Running;
        self.release(&execution).await?;
        Ok(AdvanceOutcome {
            execution: execution.snapshot(),
            completed: false,
            requires_user_input: false,
        })
    }

    /// Record the awaiting step as pending and park the execution.
    async fn pause_for_input(
        &self,
        mut execution: WorkflowExecution,
        step_index: usize,
    ) -> Result<AdvanceOutcome, EngineError> {
        let pending = ExecutionStep::pending(execution.id.clone(), step_index);
        if let Err(e) = self.executions.upsert_step(&pending).await {
            return Err(self.fail_execution(execution, None, e).await);
        }

        let now = Utc::now();
        execution.status = ExecutionStatus::Paused;
        execution.paused_at = Some(now);
        execution.updated_at = now;
        self.release(&execution).await?;

        tracing::info!(
            execution_id = %execution.id,
            step_order = step_index,
            "execution paused awaiting user input"
        );
        Ok(AdvanceOutcome {
            execution: execution.snapshot(),
            completed: false,
            requires_user_input: true,
        })
    }

    /// Swap the in-flight marker out for the execution's new status.
    async fn release(&self, execution: &WorkflowExecution) -> Result<(), EngineError> {
        match self
            .executions
            .compare_and_swap(&execution.id, ExecutionStatus::StepRunning, execution)
            .await
        {
            Ok(()) => Ok(()),
            Err(EngineError::Conflict(msg)) => {
                // Nothing else may touch a claimed execution; losing the
                // marker means the repository was modified out of band.
                tracing::error!(execution_id = %execution.id, %msg, "lost the in-flight marker");
                Err(EngineError::Internal(format!(
                    "lost the in-flight marker for execution {}: {}",
                    execution.id, msg
                )))
            }
            Err(e) => Err(e),
        }
    }

    /// Undo a `submit_input` claim whose guards failed: the execution goes
    /// back to `paused` untouched and the guard error is returned.
    async fn abort_claim_to_paused(
        &self,
        mut execution: WorkflowExecution,
        error: EngineError,
    ) -> EngineError {
        execution.status = ExecutionStatus::Paused;
        execution.updated_at = Utc::now();
        if let Err(e) = self.release(&execution).await {
            tracing::error!(execution_id = %execution.id, error = %e, "failed to restore paused status");
        }
        error
    }

    /// Persist a step failure and terminate the execution as failed,
    /// returning the original error. Failed executions stay queryable.
    async fn fail_execution(
        &self,
        mut execution: WorkflowExecution,
        record: Option<ExecutionStep>,
        error: EngineError,
    ) -> EngineError {
        if let Some(record) = record {
            if let Err(e) = self.executions.upsert_step(&record).await {
                tracing::error!(execution_id = %execution.id, error = %e, "failed to persist failed step record");
            }
        }

        let now = Utc::now();
        execution.status = ExecutionStatus::Failed;
        execution.error_message = Some(error.to_string());
        execution.failed_at = Some(now);
        execution.updated_at = now;
        if let Err(e) = self.release(&execution).await {
            tracing::error!(execution_id = %execution.id, error = %e, "failed to persist failed execution");
        }

        tracing::warn!(
            execution_id = %execution.id,
            step_order = execution.current_step_order,
            error = %error,
            "step failed; execution failed"
        );
        error
    }
}
