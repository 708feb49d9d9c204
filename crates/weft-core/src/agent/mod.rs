//! Agent invoker contract and registry.
//!
//! The engine treats an agent as an opaque, potentially slow, potentially
//! failing remote call: resolved payload in, structured output plus usage
//! metadata out. Which agents exist, and how each one is reached, is decided
//! by the registry injected at construction time — there is no process-wide
//! agent state.

pub mod capability;
pub mod http;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use capability::{Capability, CapabilitySet, ToolDescriptor};
pub use http::HttpAgentInvoker;

/// Fully resolved payload dispatched to an agent for one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPayload {
    /// The resolved prompt, with all `{{...}}` references expanded.
    pub prompt: String,
    /// User input collected for the step, if the step required it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageInfo {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// What an agent returns: an opaque structured output plus usage metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReply {
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageInfo>,
}

/// Dispatches one resolved payload to one agent.
///
/// Implementations must have no side effects on the caller's state beyond
/// the returned value. The payload is assumed to have passed any
/// capability filtering already (see [`capability`]).
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, agent_ref: &str, payload: &AgentPayload) -> Result<AgentReply, String>;
}

struct RegisteredAgent {
    invoker: Arc<dyn AgentInvoker>,
    capabilities: CapabilitySet,
}

/// Explicit map of `agent_ref → invoker`, passed into the engine at
/// construction time.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, RegisteredAgent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent_ref: &str, invoker: Arc<dyn AgentInvoker>) {
        self.register_with_capabilities(agent_ref, invoker, CapabilitySet::none());
    }

    pub fn register_with_capabilities(
        &mut self,
        agent_ref: &str,
        invoker: Arc<dyn AgentInvoker>,
        capabilities: CapabilitySet,
    ) {
        self.agents.insert(
            agent_ref.to_string(),
            RegisteredAgent {
                invoker,
                capabilities,
            },
        );
    }

    pub fn capabilities(&self, agent_ref: &str) -> Option<&CapabilitySet> {
        self.agents.get(agent_ref).map(|a| &a.capabilities)
    }

    pub fn contains(&self, agent_ref: &str) -> bool {
        self.agents.contains_key(agent_ref)
    }

    /// Resolve the agent and dispatch the payload to it.
    pub async fn invoke(
        &self,
        agent_ref: &str,
        payload: &AgentPayload,
    ) -> Result<AgentReply, String> {
        let agent = self.agents.get(agent_ref).ok_or_else(|| {
            format!(
                "Unknown agent '{}'. Registered: {:?}",
                agent_ref,
                self.agents.keys().collect::<Vec<_>>()
            )
        })?;
        agent.invoker.invoke(agent_ref, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticAgent(Value);

    #[async_trait]
    impl AgentInvoker for StaticAgent {
        async fn invoke(
            &self,
            _agent_ref: &str,
            _payload: &AgentPayload,
        ) -> Result<AgentReply, String> {
            Ok(AgentReply {
                output: self.0.clone(),
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn test_registry_dispatches_by_ref() {
        let mut registry = AgentRegistry::new();
        registry.register("echo", Arc::new(StaticAgent(serde_json::json!("hi"))));

        let payload = AgentPayload {
            prompt: "p".into(),
            user_input: None,
        };
        let reply = registry.invoke("echo", &payload).await.unwrap();
        assert_eq!(reply.output, serde_json::json!("hi"));
    }

    #[tokio::test]
    async fn test_unknown_agent_is_an_error() {
        let registry = AgentRegistry::new();
        let payload = AgentPayload {
            prompt: "p".into(),
            user_input: None,
        };
        let err = registry.invoke("missing", &payload).await.unwrap_err();
        assert!(err.contains("Unknown agent"));
    }
}
