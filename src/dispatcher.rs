//! Dispatcher - one turn from a principal's message to a persisted reply

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agent::{Agent, AgentRegistry, Router};
use crate::error::Error;
use crate::store::{lock, Message, MessageStore, NewMessage};
use crate::Result;

/// What happened to an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Not from the principal; stored but never routed
    Ignored,
    /// Already answered, or a turn for it is in flight; no second reply
    Duplicate,
    /// The selected agent's persisted reply
    Replied(Message),
}

/// Routes principal messages to agents and persists their replies
pub struct Dispatcher {
    store: Arc<dyn MessageStore>,
    registry: Arc<AgentRegistry>,
    router: Router,
    principal_role: String,
    in_flight: Mutex<HashSet<i64>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn MessageStore>,
        registry: Arc<AgentRegistry>,
        router: Router,
        principal_role: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            router,
            principal_role: principal_role.into(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn principal_role(&self) -> &str {
        &self.principal_role
    }

    /// Number of turns currently running
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Principal messages across all rooms still waiting for a reply, oldest first
    pub async fn unanswered(&self) -> Result<Vec<i64>> {
        let rooms = self.store.rooms().await?;
        let mut waiting: Vec<&Message> = rooms
            .iter()
            .flat_map(|room| unanswered_in(&room.messages, &self.principal_role))
            .collect();
        waiting.sort_by_key(|m| (m.timestamp, m.id));
        Ok(waiting.into_iter().map(|m| m.id).collect())
    }

    /// Persist a message from the principal
    pub async fn post(&self, user_name: &str, text: &str, room_id: i64) -> Result<Message> {
        self.store
            .append(NewMessage::new(user_name, text, &self.principal_role, room_id))
            .await
    }

    /// Pick the agent that would answer `text`, without persisting anything
    pub async fn route(&self, text: &str) -> Result<Arc<Agent>> {
        self.router.select_agent(text, self.registry.agents()).await
    }

    /// Handle a stored message by id
    pub async fn handle_id(&self, message_id: i64) -> Result<TurnOutcome> {
        let message = self
            .store
            .get(message_id)
            .await?
            .ok_or_else(|| Error::Store(format!("message {} not found", message_id)))?;
        self.handle_inbound(&message).await
    }

    /// Run one turn for `message`.
    ///
    /// Only principal messages are routed. A message that already has a
    /// reply, or whose turn is running right now, yields no second reply.
    /// A message addressed to an agent but left without a reply (a turn cut
    /// short) resumes with that agent instead of being routed again.
    pub async fn handle_inbound(&self, message: &Message) -> Result<TurnOutcome> {
        if message.role != self.principal_role {
            debug!("Message {} from {} is not routed", message.id, message.role);
            return Ok(TurnOutcome::Ignored);
        }

        if !lock(&self.in_flight).insert(message.id) {
            debug!("Message {} already in flight", message.id);
            return Ok(TurnOutcome::Duplicate);
        }

        let span = info_span!("turn", turn_id = %Uuid::new_v4(), message_id = message.id);
        let result = self.run_turn(message.id).instrument(span).await;

        // The store now records whether the message is answered
        lock(&self.in_flight).remove(&message.id);
        result
    }

    async fn run_turn(&self, message_id: i64) -> Result<TurnOutcome> {
        let Some(message) = self.store.get(message_id).await? else {
            return Err(Error::Store(format!("message {} not found", message_id)));
        };

        let (agent, addressed) = match message.recipient_role.clone() {
            None => {
                let agent = self.route(&message.text).await?;
                let addressed = self.store.tag_recipient(message.id, agent.role()).await?;
                (agent, addressed)
            }
            Some(role) => {
                let room = self.store.list(message.meeting_room_id).await?;
                if !unanswered_in(&room, &self.principal_role)
                    .iter()
                    .any(|m| m.id == message.id)
                {
                    debug!("Message {} already answered by {}", message.id, role);
                    return Ok(TurnOutcome::Duplicate);
                }
                let Some(agent) = self.registry.get(&role) else {
                    warn!("Message {} is addressed to unknown role {}", message.id, role);
                    return Err(Error::Config(format!("No agent for role '{}'", role)));
                };
                info!("Resuming unanswered message {} with {}", message.id, role);
                (agent, message)
            }
        };

        let text = agent.respond(&addressed).await?;
        let reply = agent.post(&text, addressed.meeting_room_id).await?;
        let reply = self.store.tag_recipient(reply.id, &self.principal_role).await?;

        info!(
            "{} replied to message {} with message {}",
            agent.role(),
            addressed.id,
            reply.id
        );
        Ok(TurnOutcome::Replied(reply))
    }
}

/// Principal messages in one room (oldest first) that no reply answers yet.
///
/// Each reply to the principal answers the earliest waiting question that
/// was addressed to the replying role.
fn unanswered_in<'a>(messages: &'a [Message], principal_role: &str) -> Vec<&'a Message> {
    let mut waiting: Vec<&Message> = Vec::new();
    for message in messages {
        if message.role == principal_role {
            waiting.push(message);
        } else if message.recipient_role.as_deref() == Some(principal_role) {
            if let Some(pos) = waiting
                .iter()
                .position(|q| q.recipient_role.as_deref() == Some(message.role.as_str()))
            {
                waiting.remove(pos);
            }
        }
    }
    waiting
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::{FakeLlmClient, LlmClient};
    use crate::agent::{AgentProfile, LlmResponse, ToolCallRequest, FALLBACK_REPLY};
    use crate::store::InMemoryStore;
    use crate::tools::{CalendarEvent, CalendarProvider, CalendarTool, ToolRunner};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    struct OneMeeting;

    #[async_trait]
    impl CalendarProvider for OneMeeting {
        async fn events(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<Vec<CalendarEvent>> {
            Ok(vec![CalendarEvent {
                subject: "Meeting with Engineering Manager".to_string(),
                start: "2024-03-04T09:00:00".to_string(),
                end: "2024-03-04T10:00:00".to_string(),
                location: None,
            }])
        }
    }

    async fn dispatcher(client: Arc<FakeLlmClient>) -> (Dispatcher, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store.ensure_room(1).await.unwrap();

        let mut available = ToolRunner::new();
        available.register(CalendarTool::new(Arc::new(OneMeeting)));
        let mut assistant = AgentProfile::assistant();
        assistant.tools = vec!["calendar_events".to_string()];

        let client: Arc<dyn LlmClient> = client;
        let registry = AgentRegistry::from_profiles(
            &[assistant, AgentProfile::engineering_manager()],
            &available,
            client.clone(),
            store.clone(),
            3,
        )
        .unwrap();

        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(registry),
            Router::new(client, "CEO"),
            "CEO",
        );
        (dispatcher, store)
    }

    #[tokio::test]
    async fn test_non_principal_is_never_routed() {
        let client = Arc::new(FakeLlmClient::new(vec![]));
        let (dispatcher, store) = dispatcher(client.clone()).await;

        let msg = store
            .append(NewMessage::new("Michael", "Status update", "Engineering Manager", 1))
            .await
            .unwrap();

        assert_eq!(dispatcher.handle_inbound(&msg).await.unwrap(), TurnOutcome::Ignored);
        assert_eq!(client.calls(), 0);
        assert!(store.get(msg.id).await.unwrap().unwrap().recipient_role.is_none());
    }

    #[tokio::test]
    async fn test_schedule_question_end_to_end() {
        let client = Arc::new(FakeLlmClient::scripted(vec![
            LlmResponse::text("CEO Assistant"),
            LlmResponse::tool_calls(vec![ToolCallRequest::new(
                "call_1",
                "calendar_events",
                json!({"start_time": "2024-03-04T09:00:00", "end_time": "2024-03-08T17:00:00"})
                    .to_string(),
            )]),
            LlmResponse::text("You have one meeting with the Engineering Manager on Monday."),
        ]));
        let (dispatcher, store) = dispatcher(client.clone()).await;

        let msg = dispatcher.post("Sam", "What's my schedule this week?", 1).await.unwrap();
        let outcome = dispatcher.handle_inbound(&msg).await.unwrap();

        let TurnOutcome::Replied(reply) = outcome else {
            panic!("expected a reply, got {:?}", outcome);
        };
        assert_eq!(reply.user_name, "Amy");
        assert_eq!(reply.role, "CEO Assistant");
        assert_eq!(reply.recipient_role.as_deref(), Some("CEO"));
        assert_eq!(reply.text, "You have one meeting with the Engineering Manager on Monday.");

        let question = store.get(msg.id).await.unwrap().unwrap();
        assert_eq!(question.recipient_role.as_deref(), Some("CEO Assistant"));

        let tool_round = &client.requests()[2];
        let tool_result = tool_round.last().unwrap();
        assert!(tool_result.content.contains("Meeting with Engineering Manager"));

        let room = store.list(1).await.unwrap();
        assert_eq!(room.len(), 2);
        assert!(room[0].timestamp < room[1].timestamp);
    }

    #[tokio::test]
    async fn test_second_call_is_duplicate() {
        let client = Arc::new(FakeLlmClient::new(vec!["Engineering Manager", "On track."]));
        let (dispatcher, store) = dispatcher(client.clone()).await;

        let msg = dispatcher.post("Sam", "How is the release?", 1).await.unwrap();
        assert!(matches!(
            dispatcher.handle_inbound(&msg).await.unwrap(),
            TurnOutcome::Replied(_)
        ));
        assert_eq!(dispatcher.handle_inbound(&msg).await.unwrap(), TurnOutcome::Duplicate);
        assert_eq!(dispatcher.handle_id(msg.id).await.unwrap(), TurnOutcome::Duplicate);

        assert_eq!(store.list(1).await.unwrap().len(), 2);
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_addressed_message_without_reply_resumes() {
        let client = Arc::new(FakeLlmClient::new(vec!["Release is on track."]));
        let (dispatcher, store) = dispatcher(client.clone()).await;

        let msg = dispatcher.post("Sam", "Release?", 1).await.unwrap();
        store.tag_recipient(msg.id, "Engineering Manager").await.unwrap();

        let TurnOutcome::Replied(reply) = dispatcher.handle_id(msg.id).await.unwrap() else {
            panic!("expected a reply");
        };
        assert_eq!(reply.role, "Engineering Manager");
        assert_eq!(reply.text, "Release is on track.");

        // Answered without asking the router again
        assert_eq!(client.calls(), 1);
        assert_eq!(dispatcher.handle_id(msg.id).await.unwrap(), TurnOutcome::Duplicate);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_claims_are_released() {
        let client = Arc::new(FakeLlmClient::new(vec!["Engineering Manager", "Fine.", "CFO"]));
        let (dispatcher, _store) = dispatcher(client).await;

        let ok = dispatcher.post("Sam", "Release?", 1).await.unwrap();
        dispatcher.handle_inbound(&ok).await.unwrap();
        assert_eq!(dispatcher.in_flight(), 0);

        let bad = dispatcher.post("Sam", "Budget?", 1).await.unwrap();
        assert!(dispatcher.handle_inbound(&bad).await.is_err());
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_unanswered_messages() {
        let client = Arc::new(FakeLlmClient::new(vec![]));
        let (dispatcher, store) = dispatcher(client).await;

        let answered = dispatcher.post("Sam", "Release?", 1).await.unwrap();
        store.tag_recipient(answered.id, "Engineering Manager").await.unwrap();
        let reply = store
            .append(NewMessage::new("Michael", "On track.", "Engineering Manager", 1))
            .await
            .unwrap();
        store.tag_recipient(reply.id, "CEO").await.unwrap();

        let cut_short = dispatcher.post("Sam", "Bugs?", 1).await.unwrap();
        store.tag_recipient(cut_short.id, "Engineering Manager").await.unwrap();
        let never_started = dispatcher.post("Sam", "Schedule?", 1).await.unwrap();

        // A greeting is not a reply
        store
            .append(NewMessage::new("Amy", "Hello, I'm here to assist the CEO.", "CEO Assistant", 1))
            .await
            .unwrap();

        assert_eq!(
            dispatcher.unanswered().await.unwrap(),
            vec![cut_short.id, never_started.id]
        );
    }

    #[tokio::test]
    async fn test_invalid_route_posts_nothing() {
        let client = Arc::new(FakeLlmClient::new(vec!["Marketing Manager"]));
        let (dispatcher, store) = dispatcher(client).await;

        let msg = dispatcher.post("Sam", "Campaign results?", 1).await.unwrap();
        let result = dispatcher.handle_inbound(&msg).await;

        assert!(matches!(result, Err(Error::InvalidRoutingResponse(_))));
        assert_eq!(store.list(1).await.unwrap().len(), 1);
        assert!(store.get(msg.id).await.unwrap().unwrap().recipient_role.is_none());
    }

    #[tokio::test]
    async fn test_fallback_reply_is_persisted() {
        let mut responses = vec![LlmResponse::text("CEO Assistant")];
        for i in 0..3 {
            responses.push(LlmResponse::tool_calls(vec![
                ToolCallRequest::new(
                    format!("call_{}", i),
                    "calendar_events",
                    r#"{"start_time": "2024-03-04", "end_time": "2024-03-05"}"#,
                ),
            ]));
        }
        let client = Arc::new(FakeLlmClient::scripted(responses));
        let (dispatcher, _store) = dispatcher(client.clone()).await;

        let msg = dispatcher.post("Sam", "Anything?", 1).await.unwrap();
        let TurnOutcome::Replied(reply) = dispatcher.handle_inbound(&msg).await.unwrap() else {
            panic!("expected a reply");
        };
        assert_eq!(reply.text, FALLBACK_REPLY);
        assert_eq!(client.calls(), 4);
    }

    #[tokio::test]
    async fn test_route_does_not_persist() {
        let client = Arc::new(FakeLlmClient::new(vec!["Engineering Manager"]));
        let (dispatcher, store) = dispatcher(client).await;

        let agent = dispatcher.route("Is the release on track?").await.unwrap();
        assert_eq!(agent.name(), "Michael");
        assert!(store.list(1).await.unwrap().is_empty());
    }
}
