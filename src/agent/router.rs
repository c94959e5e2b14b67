//! Router - picks which agent answers a principal's message

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::Result;

use super::llm::LlmClient;
use super::loop_impl::Agent;

/// Asks the language model which role should answer
pub struct Router {
    client: Arc<dyn LlmClient>,
    principal_role: String,
}

impl Router {
    pub fn new(client: Arc<dyn LlmClient>, principal_role: impl Into<String>) -> Self {
        Self {
            client,
            principal_role: principal_role.into(),
        }
    }

    /// Routing prompt listing every candidate's name, role and responsibility
    pub fn build_prompt(&self, message_text: &str, candidates: &[Arc<Agent>]) -> String {
        let options: Vec<_> = candidates
            .iter()
            .map(|a| {
                json!({
                    "name": a.name(),
                    "role": a.role(),
                    "responsibility": a.responsibility(),
                })
            })
            .collect();

        let example = candidates.first().map(|a| a.role()).unwrap_or("CEO Assistant");

        format!(
            "Who should respond to this message from the company's {principal}: {text}\n\
             Options: {options}\n\
             Only one role should respond. Please reply with the name of the role only. \
             For example, \"{example}\".",
            principal = self.principal_role,
            text = message_text,
            options = serde_json::Value::Array(options),
            example = example,
        )
    }

    /// Choose exactly one candidate for `message_text`.
    ///
    /// The model's reply must name a candidate role verbatim once surrounding
    /// whitespace and a pair of matching quotes are removed.
    pub async fn select_agent(
        &self,
        message_text: &str,
        candidates: &[Arc<Agent>],
    ) -> Result<Arc<Agent>> {
        if candidates.is_empty() {
            return Err(Error::Config("No agents available for routing".to_string()));
        }

        let prompt = self.build_prompt(message_text, candidates);
        let reply = self.client.complete(&prompt).await?;
        let role = normalize_reply(&reply);
        debug!("Router replied {:?}", reply);

        match candidates.iter().find(|a| a.role() == role) {
            Some(agent) => {
                info!("Routed to {} ({})", agent.role(), agent.name());
                Ok(agent.clone())
            }
            None => {
                warn!("Router reply matches no agent: {:?}", reply);
                Err(Error::InvalidRoutingResponse(reply))
            }
        }
    }
}

fn normalize_reply(reply: &str) -> &str {
    let trimmed = reply.trim();
    for quote in ['"', '\'', '`'] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::FakeLlmClient;
    use crate::agent::AgentProfile;

    fn agents(client: Arc<FakeLlmClient>) -> Vec<Arc<Agent>> {
        vec![
            Arc::new(Agent::new(AgentProfile::assistant(), client.clone())),
            Arc::new(Agent::new(AgentProfile::engineering_manager(), client)),
        ]
    }

    #[test]
    fn test_normalize_reply() {
        assert_eq!(normalize_reply("  CEO Assistant\n"), "CEO Assistant");
        assert_eq!(normalize_reply("\"Engineering Manager\""), "Engineering Manager");
        assert_eq!(normalize_reply("'CEO Assistant'"), "CEO Assistant");
        assert_eq!(normalize_reply("\"CEO Assistant'"), "\"CEO Assistant'");
    }

    #[test]
    fn test_prompt_lists_candidates() {
        let client = Arc::new(FakeLlmClient::new(vec![]));
        let router = Router::new(client.clone(), "CEO");
        let prompt = router.build_prompt("How is the release going?", &agents(client));

        assert!(prompt.contains("How is the release going?"));
        assert!(prompt.contains("\"role\":\"CEO Assistant\""));
        assert!(prompt.contains("\"name\":\"Michael\""));
        assert!(prompt.contains("Provides updates on software development progress."));
    }

    #[tokio::test]
    async fn test_select_agent() {
        let client = Arc::new(FakeLlmClient::new(vec!["CEO Assistant"]));
        let router = Router::new(client.clone(), "CEO");

        let agent = router
            .select_agent("What's my schedule?", &agents(client.clone()))
            .await
            .unwrap();
        assert_eq!(agent.role(), "CEO Assistant");
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_select_agent_tolerates_quotes() {
        let client = Arc::new(FakeLlmClient::new(vec![" \"Engineering Manager\" "]));
        let router = Router::new(client.clone(), "CEO");

        let agent = router.select_agent("Release?", &agents(client)).await.unwrap();
        assert_eq!(agent.name(), "Michael");
    }

    #[tokio::test]
    async fn test_unknown_role_is_rejected() {
        let client = Arc::new(FakeLlmClient::new(vec!["Marketing Manager"]));
        let router = Router::new(client.clone(), "CEO");

        let result = router.select_agent("Campaign?", &agents(client)).await;
        assert!(matches!(result, Err(Error::InvalidRoutingResponse(r)) if r == "Marketing Manager"));
    }

    #[tokio::test]
    async fn test_partial_match_is_rejected() {
        let client = Arc::new(FakeLlmClient::new(vec!["The CEO Assistant should answer"]));
        let router = Router::new(client.clone(), "CEO");

        let result = router.select_agent("Schedule?", &agents(client)).await;
        assert!(matches!(result, Err(Error::InvalidRoutingResponse(_))));
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let client = Arc::new(FakeLlmClient::new(vec!["CEO Assistant"]));
        let router = Router::new(client.clone(), "CEO");

        assert!(router.select_agent("Hi", &[]).await.is_err());
        assert_eq!(client.calls(), 0);
    }
}
