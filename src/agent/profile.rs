//! Agent profiles - the configuration that makes an agent who it is

use serde::{Deserialize, Serialize};

/// Constructor-supplied identity of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Display name used when posting (e.g. "Amy")
    pub name: String,

    /// Unique role key (e.g. "CEO Assistant")
    pub role: String,

    /// One-line responsibility shown to the router
    pub responsibility: String,

    /// System prompt; `{name}` is replaced with the agent's name
    pub system_prompt: String,

    /// Names of the tools this agent may call
    #[serde(default)]
    pub tools: Vec<String>,

    /// Posted to the default room at startup
    #[serde(default)]
    pub greeting: Option<String>,
}

impl AgentProfile {
    /// The CEO's assistant: schedule and mailbox questions
    pub fn assistant() -> Self {
        Self {
            name: "Amy".to_string(),
            role: "CEO Assistant".to_string(),
            responsibility: "Provides administrative support to the CEO: schedule, meetings, \
                             email and coordinating the CEO's questions."
                .to_string(),
            system_prompt: "You are the Chief Executive Officer's assistant {name}. Your main \
                responsibility is to provide administrative support to the CEO and coordinate \
                the CEO's questions. You are a key member of the CEO's team: make sure each \
                question gets answered by the right person, and communicate clearly with the \
                CEO using the information available to you. Use your tools to look up the \
                CEO's calendar and mailbox instead of guessing."
                .to_string(),
            tools: vec!["calendar_events".to_string(), "email_search".to_string()],
            greeting: Some("Hello, I'm here to assist the CEO.".to_string()),
        }
    }

    /// The engineering manager: software delivery questions
    pub fn engineering_manager() -> Self {
        Self {
            name: "Michael".to_string(),
            role: "Engineering Manager".to_string(),
            responsibility: "Provides updates on software development progress.".to_string(),
            system_prompt: "You are the Software Engineering Manager {name}. Your main \
                responsibility is to provide updates on software development progress. Your \
                team uses Jira to manage the development process. Communicate clearly with the \
                CEO and other team members to keep development on track."
                .to_string(),
            tools: Vec::new(),
            greeting: Some("Hello, I'm the Engineering Manager.".to_string()),
        }
    }

    /// Default meeting room line-up
    pub fn builtin() -> Vec<Self> {
        vec![Self::assistant(), Self::engineering_manager()]
    }

    /// System prompt with the agent's name filled in
    pub fn render_system_prompt(&self) -> String {
        self.system_prompt.replace("{name}", &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_roles_unique() {
        let profiles = AgentProfile::builtin();
        assert_eq!(profiles[0].role, "CEO Assistant");
        assert_eq!(profiles[1].role, "Engineering Manager");
    }

    #[test]
    fn test_render_system_prompt() {
        let prompt = AgentProfile::assistant().render_system_prompt();
        assert!(prompt.contains("assistant Amy."));
        assert!(!prompt.contains("{name}"));
    }

    #[test]
    fn test_deserialize_minimal_profile() {
        let profile: AgentProfile = serde_json::from_str(
            r#"{"name": "Dana", "role": "Marketing Manager",
                "responsibility": "Campaigns", "system_prompt": "You are {name}."}"#,
        )
        .unwrap();
        assert!(profile.tools.is_empty());
        assert!(profile.greeting.is_none());
        assert_eq!(profile.render_system_prompt(), "You are Dana.");
    }
}
