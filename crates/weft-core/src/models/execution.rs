//! Workflow execution types — one run of a template, with its own status,
//! step records, and accumulated context.
//!
//! `accumulatedContext` is the working memory of the run: a JSON object with
//! an `initialContext` entry plus one `step<N>` entry per attempted step
//! holding that step's `output` and (when collected) `userInput`. Keys are
//! append-only — later steps read earlier entries, never rewrite them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Execution lifecycle status.
///
/// `StepRunning` is an internal marker: it is held for the duration of an
/// in-flight step so that racing operations observe a conflict instead of
/// interleaving. Snapshots collapse it to `Running` — it never appears in
/// API output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    StepRunning,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::StepRunning => "step_running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "step_running" => Some(Self::StepRunning),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Map the internal in-flight marker to the externally visible status.
    pub fn collapsed(&self) -> Self {
        match self {
            Self::StepRunning => Self::Running,
            other => *other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Status of one attempted step within an execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// One running instance of a workflow template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: String,
    pub template_id: String,
    pub owner_id: String,
    pub status: ExecutionStatus,
    /// Index of the step last attempted or awaiting input; equals the step
    /// count exactly when the execution completed.
    pub current_step_order: usize,
    pub accumulated_context: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowExecution {
    pub fn new(id: String, template_id: String, owner_id: String, initial_context: Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            template_id,
            owner_id,
            status: ExecutionStatus::Running,
            current_step_order: 0,
            accumulated_context: serde_json::json!({ "initialContext": initial_context }),
            error_message: None,
            started_at: now,
            paused_at: None,
            completed_at: None,
            failed_at: None,
            updated_at: now,
        }
    }

    /// Context key for a step's entry, e.g. `step0`.
    pub fn context_key(step_order: usize) -> String {
        format!("step{}", step_order)
    }

    fn step_entry(&self, step_order: usize) -> Option<&Value> {
        self.accumulated_context.get(Self::context_key(step_order))
    }

    fn insert_step_field(&mut self, step_order: usize, field: &str, value: Value) {
        let key = Self::context_key(step_order);
        if let Some(map) = self.accumulated_context.as_object_mut() {
            if let Some(entry) = map
                .entry(key)
                .or_insert_with(|| Value::Object(Default::default()))
                .as_object_mut()
            {
                entry.insert(field.to_string(), value);
            }
        }
    }

    /// Append a completed step's output to the accumulated context under
    /// `step<N>.output`, making it visible to all later steps.
    pub fn record_step_output(&mut self, step_order: usize, output: Value) {
        self.insert_step_field(step_order, "output", output);
    }

    /// Merge submitted user input into the context under `step<N>.userInput`
    /// so the same step's prompt can reference it.
    pub fn record_user_input(&mut self, step_order: usize, input: Value) {
        self.insert_step_field(step_order, "userInput", input);
    }

    pub fn step_output(&self, step_order: usize) -> Option<&Value> {
        self.step_entry(step_order).and_then(|e| e.get("output"))
    }

    pub fn user_input(&self, step_order: usize) -> Option<&Value> {
        self.step_entry(step_order).and_then(|e| e.get("userInput"))
    }

    /// Immutable view with the internal in-flight marker collapsed.
    pub fn snapshot(&self) -> Self {
        let mut view = self.clone();
        view.status = view.status.collapsed();
        view
    }
}

/// One record per attempted step of an execution. Re-attempts after a pause
/// update the same record rather than creating duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub execution_id: String,
    pub step_order: usize,
    pub status: StepStatus,
    /// Fully resolved payload sent to the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionStep {
    pub fn pending(execution_id: String, step_order: usize) -> Self {
        Self {
            execution_id,
            step_order,
            status: StepStatus::Pending,
            agent_input: None,
            agent_output: None,
            user_input: None,
            error_message: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Share of steps completed, as a percentage.
pub fn progress_percentage(completed_steps: usize, total_steps: usize) -> f64 {
    if total_steps == 0 {
        return 0.0;
    }
    completed_steps as f64 / total_steps as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ExecutionStatus::Running,
            ExecutionStatus::StepRunning,
            ExecutionStatus::Paused,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Cancelled,
        ] {
            assert_eq!(ExecutionStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(ExecutionStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_step_running_collapses_to_running() {
        let mut execution = WorkflowExecution::new(
            "e1".into(),
            "t1".into(),
            "default".into(),
            serde_json::json!({}),
        );
        execution.status = ExecutionStatus::StepRunning;
        assert_eq!(execution.snapshot().status, ExecutionStatus::Running);
        assert!(!ExecutionStatus::StepRunning.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_context_accumulates_per_step() {
        let mut execution = WorkflowExecution::new(
            "e1".into(),
            "t1".into(),
            "default".into(),
            serde_json::json!({ "topic": "AI safety" }),
        );

        execution.record_step_output(0, serde_json::json!("a summary"));
        execution.record_user_input(1, serde_json::json!({ "notes": "be concise" }));
        execution.record_step_output(1, serde_json::json!("refined"));

        assert_eq!(
            execution.accumulated_context["initialContext"]["topic"],
            "AI safety"
        );
        assert_eq!(execution.step_output(0), Some(&serde_json::json!("a summary")));
        assert_eq!(
            execution.user_input(1),
            Some(&serde_json::json!({ "notes": "be concise" }))
        );
        assert_eq!(execution.step_output(1), Some(&serde_json::json!("refined")));
        assert_eq!(execution.user_input(0), None);
    }

    #[test]
    fn test_progress_percentage() {
        assert_eq!(progress_percentage(0, 4), 0.0);
        assert_eq!(progress_percentage(1, 2), 50.0);
        assert_eq!(progress_percentage(3, 3), 100.0);
        assert_eq!(progress_percentage(0, 0), 0.0);
    }
}
