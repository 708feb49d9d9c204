//! Workflow template types.
//!
//! A template defines a multi-step agent pipeline. Templates can be created
//! over the API or authored as YAML files:
//!
//! ```yaml
//! name: "Research brief"
//! description: "Summarize a topic, then refine with reviewer notes"
//!
//! steps:
//!   - stepOrder: 0
//!     agentRef: "summarizer"
//!     promptTemplate: "Summarize: {{initialContext.topic}}"
//!
//!   - stepOrder: 1
//!     agentRef: "refiner"
//!     promptTemplate: "Refine using: {{step0.output}} and {{step1.userInput}}"
//!     requiresUserInput: true
//!     inputSchema:
//!       notes: "string"
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "public" => Self::Public,
            _ => Self::Private,
        }
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::Private
    }
}

/// One agent invocation within a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    /// Position in the pipeline. Strictly increasing from 0, no gaps.
    pub step_order: usize,

    /// Opaque agent identifier, resolved by the agent registry.
    pub agent_ref: String,

    /// Prompt template with `{{...}}` context references.
    pub prompt_template: String,

    /// When true, the execution pauses at this step until a caller submits
    /// input; the input is merged into context before the agent is called.
    #[serde(default)]
    pub requires_user_input: bool,

    /// Structural description of the expected user input. Opaque to the
    /// engine — passed through to callers for rendering, never validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

/// Reusable ordered definition of agent steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner_id: String,
    #[serde(default)]
    pub visibility: Visibility,
    pub steps: Vec<WorkflowStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowTemplate {
    pub fn new(
        id: String,
        name: String,
        description: Option<String>,
        owner_id: String,
        visibility: Visibility,
        steps: Vec<WorkflowStep>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            description,
            owner_id,
            visibility,
            steps,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check the template against the creation-time rules: a non-empty name,
    /// at least one step, and contiguous step orders starting at 0.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation(
                "template name must not be empty".to_string(),
            ));
        }
        if self.steps.is_empty() {
            return Err(EngineError::Validation(
                "template must have at least one step".to_string(),
            ));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.step_order != i {
                return Err(EngineError::Validation(format!(
                    "step orders must be contiguous from 0: expected {} at position {}, got {}",
                    i, i, step.step_order
                )));
            }
            if step.agent_ref.trim().is_empty() {
                return Err(EngineError::Validation(format!(
                    "step {} has an empty agentRef",
                    i
                )));
            }
        }
        Ok(())
    }

    /// Parse a template from a YAML document. The template is validated;
    /// `id`/`ownerId` may be omitted in the file and default to fresh values.
    pub fn from_yaml(yaml: &str) -> Result<Self, EngineError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct TemplateFile {
            #[serde(default)]
            id: Option<String>,
            name: String,
            #[serde(default)]
            description: Option<String>,
            #[serde(default)]
            owner_id: Option<String>,
            #[serde(default)]
            visibility: Visibility,
            steps: Vec<WorkflowStep>,
        }

        let file: TemplateFile = serde_yaml::from_str(yaml)
            .map_err(|e| EngineError::Validation(format!("Failed to parse template YAML: {}", e)))?;

        let template = Self::new(
            file.id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            file.name,
            file.description,
            file.owner_id.unwrap_or_else(|| "default".to_string()),
            file.visibility,
            file.steps,
        );
        template.validate()?;
        Ok(template)
    }

    /// Load a template from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Validation(format!("Failed to read template file '{}': {}", path, e))
        })?;
        Self::from_yaml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(order: usize, agent: &str) -> WorkflowStep {
        WorkflowStep {
            step_order: order,
            agent_ref: agent.to_string(),
            prompt_template: "do the thing".to_string(),
            requires_user_input: false,
            input_schema: None,
        }
    }

    #[test]
    fn test_validate_accepts_contiguous_steps() {
        let t = WorkflowTemplate::new(
            "t1".into(),
            "Flow".into(),
            None,
            "default".into(),
            Visibility::Private,
            vec![step(0, "a"), step(1, "b"), step(2, "c")],
        );
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_step_list() {
        let t = WorkflowTemplate::new(
            "t1".into(),
            "Flow".into(),
            None,
            "default".into(),
            Visibility::Private,
            vec![],
        );
        assert!(matches!(t.validate(), Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_gapped_step_orders() {
        let t = WorkflowTemplate::new(
            "t1".into(),
            "Flow".into(),
            None,
            "default".into(),
            Visibility::Private,
            vec![step(0, "a"), step(2, "b")],
        );
        assert!(matches!(t.validate(), Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_parse_yaml_template() {
        let yaml = r#"
name: "Research brief"
steps:
  - stepOrder: 0
    agentRef: "summarizer"
    promptTemplate: "Summarize: {{initialContext.topic}}"
  - stepOrder: 1
    agentRef: "refiner"
    promptTemplate: "Refine using: {{step0.output}} and {{step1.userInput}}"
    requiresUserInput: true
"#;
        let t = WorkflowTemplate::from_yaml(yaml).unwrap();
        assert_eq!(t.name, "Research brief");
        assert_eq!(t.steps.len(), 2);
        assert!(!t.steps[0].requires_user_input);
        assert!(t.steps[1].requires_user_input);
        assert_eq!(t.owner_id, "default");
        assert_eq!(t.visibility, Visibility::Private);
    }

    #[test]
    fn test_parse_yaml_rejects_bad_step_orders() {
        let yaml = r#"
name: "Broken"
steps:
  - stepOrder: 1
    agentRef: "a"
    promptTemplate: "x"
"#;
        assert!(WorkflowTemplate::from_yaml(yaml).is_err());
    }
}
