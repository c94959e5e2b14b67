//! Agent registry - the meeting room's line-up, built once at startup

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use crate::error::Error;
use crate::store::MessageStore;
use crate::tools::ToolRunner;
use crate::Result;

use super::llm::LlmClient;
use super::loop_impl::Agent;
use super::profile::AgentProfile;

/// Agents keyed by their unique role, in configuration order
#[derive(Default)]
pub struct AgentRegistry {
    agents: Vec<Arc<Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agent; its role must not already be taken
    pub fn register(&mut self, agent: Agent) -> Result<Arc<Agent>> {
        if self.get(agent.role()).is_some() {
            return Err(Error::Config(format!("Duplicate agent role: {}", agent.role())));
        }
        let agent = Arc::new(agent);
        self.agents.push(agent.clone());
        Ok(agent)
    }

    /// Build every agent from its profile.
    ///
    /// Each agent gets the subset of `available` its profile names; naming a
    /// tool that is not available is a configuration error.
    pub fn from_profiles(
        profiles: &[AgentProfile],
        available: &ToolRunner,
        client: Arc<dyn LlmClient>,
        store: Arc<dyn MessageStore>,
        tool_call_limit: usize,
    ) -> Result<Self> {
        let mut registry = Self::new();

        for profile in profiles {
            let mut tools = ToolRunner::new();
            let mut seen = HashSet::new();
            for name in &profile.tools {
                if !seen.insert(name.as_str()) {
                    continue;
                }
                let tool = available.get(name).ok_or_else(|| {
                    Error::Config(format!("Agent '{}' lists unknown tool '{}'", profile.role, name))
                })?;
                tools.register_shared(tool);
            }

            let agent = Agent::new(profile.clone(), client.clone())
                .with_tools(tools)
                .with_store(store.clone())
                .with_tool_call_limit(tool_call_limit);

            info!(
                "Agent {} ({}) ready with tools [{}]",
                agent.name(),
                agent.role(),
                agent.tools().tool_names().join(", ")
            );
            registry.register(agent)?;
        }

        Ok(registry)
    }

    pub fn get(&self, role: &str) -> Option<Arc<Agent>> {
        self.agents.iter().find(|a| a.role() == role).cloned()
    }

    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    pub fn roles(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.role()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
