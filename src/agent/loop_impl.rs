//! Agent response loop - history, model rounds and tool dispatch

use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::store::{Message, MessageStore, NewMessage};
use crate::tools::ToolRunner;
use crate::Result;

use super::history::ConversationView;
use super::llm::LlmClient;
use super::message::ChatMessage;
use super::profile::AgentProfile;

/// Default number of model rounds per response
pub const DEFAULT_TOOL_CALL_LIMIT: usize = 3;

/// Reply used when the model does not settle on an answer within the budget
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I wasn't able to work that out. Could you clarify what you need?";

/// A role in the meeting room with its own prompt and tool set
pub struct Agent {
    profile: AgentProfile,
    system_prompt: String,
    tools: ToolRunner,
    client: Arc<dyn LlmClient>,
    store: Option<Arc<dyn MessageStore>>,
    tool_call_limit: usize,
}

impl Agent {
    /// Create an agent with no tools and no store
    pub fn new(profile: AgentProfile, client: Arc<dyn LlmClient>) -> Self {
        Self {
            system_prompt: profile.render_system_prompt(),
            profile,
            tools: ToolRunner::new(),
            client,
            store: None,
            tool_call_limit: DEFAULT_TOOL_CALL_LIMIT,
        }
    }

    /// Set the agent's tools
    pub fn with_tools(mut self, tools: ToolRunner) -> Self {
        self.tools = tools;
        self
    }

    /// Bind the message store used for history and posting
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the maximum number of model rounds (at least one)
    pub fn with_tool_call_limit(mut self, limit: usize) -> Self {
        self.tool_call_limit = limit.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn role(&self) -> &str {
        &self.profile.role
    }

    pub fn responsibility(&self) -> &str {
        &self.profile.responsibility
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn tools(&self) -> &ToolRunner {
        &self.tools
    }

    pub fn tool_call_limit(&self) -> usize {
        self.tool_call_limit
    }

    fn store(&self) -> Result<&Arc<dyn MessageStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::StoreUnavailable(self.profile.name.clone()))
    }

    /// Post a message to a room as this agent
    pub async fn post(&self, text: &str, room_id: i64) -> Result<Message> {
        let store = self.store()?;
        store
            .append(NewMessage::new(self.name(), text, self.role(), room_id))
            .await
    }

    /// Produce a reply to `incoming`.
    ///
    /// The prompt is rebuilt from every message exchanged between this
    /// agent's role and the sender's role. The model then gets at most
    /// `tool_call_limit` rounds to answer with text; tool calls it makes in
    /// between are resolved and run, and their results fed back. If no round
    /// yields text, [`FALLBACK_REPLY`] is returned.
    pub async fn respond(&self, incoming: &Message) -> Result<String> {
        let store = self.store()?;
        let history = store.list_between(self.role(), &incoming.role).await?;

        let mut view = ConversationView::between(self.role(), &incoming.role, &history);
        if !history.iter().any(|m| m.id == incoming.id) {
            view.push_other(incoming.text.clone());
        }

        info!(
            "{} responding to {} with {} history entries",
            self.role(),
            incoming.role,
            view.len()
        );

        self.run(view.to_prompt(&self.system_prompt)).await
    }

    /// Run the bounded model/tool loop over a prepared prompt sequence
    pub async fn run(&self, mut messages: Vec<ChatMessage>) -> Result<String> {
        let definitions = self.tools.definitions();
        let mut executed: Vec<String> = Vec::new();

        for round in 1..=self.tool_call_limit {
            debug!("Round {}/{}", round, self.tool_call_limit);

            let response = self.client.chat(&messages, &definitions).await?;

            if let Some(text) = response.text_content() {
                info!("{} answered in round {} ({} chars)", self.role(), round, text.len());
                return Ok(text.to_string());
            }

            if !response.has_tool_calls() {
                warn!("Model returned neither text nor tool calls in round {}", round);
                continue;
            }

            // Resolve every call before running any of them
            let resolved = response
                .tool_calls
                .iter()
                .map(|call| self.tools.resolve(call))
                .collect::<Result<Vec<_>>>()?;

            if round == self.tool_call_limit {
                debug!("Budget spent; skipping {} tool calls", resolved.len());
                break;
            }

            messages.push(ChatMessage::assistant_with_tools(
                response.content.clone().unwrap_or_default(),
                response.tool_calls.clone(),
            ));

            executed.extend(resolved.iter().map(|c| c.tool.name().to_string()));
            let results = try_join_all(resolved.into_iter().map(|call| async move {
                let id = call.id.clone();
                self.tools.execute(call).await.map(|text| (id, text))
            }))
            .await?;

            for (id, text) in results {
                messages.push(ChatMessage::tool_result(id, text));
            }
        }

        if executed.is_empty() {
            warn!("{} gave up after {} rounds", self.role(), self.tool_call_limit);
        } else {
            warn!(
                "{} gave up after {} rounds; tools already run: {}",
                self.role(),
                self.tool_call_limit,
                executed.join(", ")
            );
        }
        Ok(FALLBACK_REPLY.to_string())
    }
}
