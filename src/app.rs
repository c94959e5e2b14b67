//! Application bootstrap - wires store, tools, agents and dispatcher from config

use std::sync::Arc;

use tracing::{debug, info};

use crate::agent::{AgentRegistry, LlmClient, ProviderRegistry, Router};
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::store::{Message, MessageStore, SqliteStore};
use crate::tools::{CalendarTool, EmailSearchTool, GraphClient, ToolRunner};
use crate::Result;

/// A running meeting room
pub struct App {
    pub config: Config,
    pub store: Arc<dyn MessageStore>,
    pub dispatcher: Arc<Dispatcher>,
}

impl App {
    /// Open the configured database and LLM provider
    pub async fn from_config(config: Config) -> Result<Self> {
        let client = ProviderRegistry::create(&config)?;
        info!("Using {} model {}", config.provider, client.default_model());

        let store: Arc<dyn MessageStore> = Arc::new(SqliteStore::open(&config.database)?);
        Self::build(config, client, store).await
    }

    /// Assemble the meeting room around an existing client and store
    pub async fn build(
        config: Config,
        client: Arc<dyn LlmClient>,
        store: Arc<dyn MessageStore>,
    ) -> Result<Self> {
        config.validate()?;

        let available = builtin_tools(&config)?;
        let registry = AgentRegistry::from_profiles(
            &config.agents,
            &available,
            client.clone(),
            store.clone(),
            config.tool_call_limit,
        )?;

        store.ensure_room(config.default_room_id).await?;

        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(registry),
            Router::new(client, config.principal_role.clone()),
            config.principal_role.clone(),
        );

        Ok(Self {
            config,
            store,
            dispatcher: Arc::new(dispatcher),
        })
    }

    /// Post each agent's greeting to the default room, once per agent.
    ///
    /// Returns the greetings posted.
    pub async fn greet(&self) -> Result<Vec<Message>> {
        let room_id = self.config.default_room_id;
        let existing = self.store.list(room_id).await?;

        let mut posted = Vec::new();
        for agent in self.dispatcher.registry().agents() {
            let Some(greeting) = agent.profile().greeting.as_deref() else {
                continue;
            };
            if existing.iter().any(|m| m.role == agent.role()) {
                debug!("{} already introduced in room {}", agent.role(), room_id);
                continue;
            }
            posted.push(agent.post(greeting, room_id).await?);
        }
        Ok(posted)
    }
}

/// Tools every agent may draw from, backed by Microsoft Graph
pub fn builtin_tools(config: &Config) -> Result<ToolRunner> {
    let graph = Arc::new(GraphClient::new(&config.graph)?);

    let mut tools = ToolRunner::new();
    tools.register(CalendarTool::new(graph.clone()));
    tools.register(EmailSearchTool::new(graph));
    Ok(tools)
}
