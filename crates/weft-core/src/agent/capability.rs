//! Capability-based tool filtering for agent infrastructure.
//!
//! The engine itself never consults capabilities — a step's payload reaches
//! the invoker as-is. These types exist for the surrounding agent
//! infrastructure: an invoker implementation is expected to receive a tool
//! list already filtered through an agent's allow-list.

use serde::{Deserialize, Serialize};

/// Coarse-grained things an agent may be allowed to do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    WebSearch,
    CodeExecution,
    FileRead,
    FileWrite,
    NetworkAccess,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebSearch => "web_search",
            Self::CodeExecution => "code_execution",
            Self::FileRead => "file_read",
            Self::FileWrite => "file_write",
            Self::NetworkAccess => "network_access",
        }
    }
}

/// A tool an invoker could expose to an agent, tagged with the capability
/// it requires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub requires: Capability,
}

/// Allow-list of capabilities granted to one agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilitySet {
    allowed: Vec<Capability>,
}

impl CapabilitySet {
    pub fn new(allowed: Vec<Capability>) -> Self {
        Self { allowed }
    }

    /// An empty set: prompt-only, no tools pass the filter.
    pub fn none() -> Self {
        Self { allowed: Vec::new() }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        self.allowed.contains(&capability)
    }

    /// Keep only the tools whose required capability is granted.
    pub fn filter_tools(&self, tools: &[ToolDescriptor]) -> Vec<ToolDescriptor> {
        tools
            .iter()
            .filter(|t| self.allows(t.requires))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, requires: Capability) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            requires,
        }
    }

    #[test]
    fn test_filter_keeps_only_allowed_tools() {
        let caps = CapabilitySet::new(vec![Capability::WebSearch, Capability::FileRead]);
        let tools = vec![
            tool("search", Capability::WebSearch),
            tool("run_code", Capability::CodeExecution),
            tool("read_file", Capability::FileRead),
            tool("write_file", Capability::FileWrite),
        ];

        let filtered = caps.filter_tools(&tools);
        let names: Vec<_> = filtered.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["search", "read_file"]);
    }

    #[test]
    fn test_empty_set_filters_everything() {
        let caps = CapabilitySet::none();
        assert!(!caps.allows(Capability::NetworkAccess));
        assert!(caps
            .filter_tools(&[tool("search", Capability::WebSearch)])
            .is_empty());
    }
}
