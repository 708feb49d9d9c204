//! Step runner — executes one step of an execution.
//!
//! The runner resolves the step's prompt against the accumulated context,
//! builds the agent payload, and dispatches it through the registry. It is
//! also the component that decides whether a step must pause first: a step
//! flagged `requiresUserInput` is never dispatched until input has been
//! merged into the context, so its own prompt can reference
//! `{{stepN.userInput}}`.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentPayload, AgentRegistry, UsageInfo};
use crate::engine::resolver::resolve_prompt;
use crate::error::EngineError;
use crate::models::{WorkflowExecution, WorkflowStep};

/// A step that ran to completion.
#[derive(Debug, Clone)]
pub struct CompletedStep {
    /// The fully resolved payload that was sent to the agent.
    pub agent_input: Value,
    pub output: Value,
    pub usage: Option<UsageInfo>,
}

pub struct StepRunner {
    registry: Arc<AgentRegistry>,
}

impl StepRunner {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    /// True when the step must pause for user input before it can run.
    pub fn awaits_input(step: &WorkflowStep, execution: &WorkflowExecution) -> bool {
        step.requires_user_input && execution.user_input(step.step_order).is_none()
    }

    /// Resolve the prompt and dispatch the step to its agent. The caller's
    /// cancellation token abandons a hung invocation; abandonment surfaces
    /// as an `AgentInvocation` failure, never a hang.
    pub async fn run(
        &self,
        step: &WorkflowStep,
        execution: &WorkflowExecution,
        cancel: &CancellationToken,
    ) -> Result<CompletedStep, EngineError> {
        let prompt = resolve_prompt(&step.prompt_template, &execution.accumulated_context)?;
        let payload = AgentPayload {
            prompt,
            user_input: execution.user_input(step.step_order).cloned(),
        };

        tracing::debug!(
            execution_id = %execution.id,
            step_order = step.step_order,
            agent_ref = %step.agent_ref,
            prompt_len = payload.prompt.len(),
            "dispatching step to agent"
        );

        let reply = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(EngineError::AgentInvocation(
                    "agent invocation abandoned by caller".to_string(),
                ));
            }
            result = self.registry.invoke(&step.agent_ref, &payload) => {
                result.map_err(EngineError::AgentInvocation)?
            }
        };

        if let Some(ref usage) = reply.usage {
            tracing::debug!(
                execution_id = %execution.id,
                step_order = step.step_order,
                input_tokens = ?usage.input_tokens,
                output_tokens = ?usage.output_tokens,
                "agent reported usage"
            );
        }

        let agent_input = serde_json::to_value(&payload)
            .map_err(|e| EngineError::Internal(format!("payload serialization failed: {}", e)))?;

        Ok(CompletedStep {
            agent_input,
            output: reply.output,
            usage: reply.usage,
        })
    }
}
