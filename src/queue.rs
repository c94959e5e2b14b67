//! Turn queue - runs principal turns off the request path

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::dispatcher::{Dispatcher, TurnOutcome};
use crate::error::Error;
use crate::Result;

/// Handle for submitting stored messages to the turn worker.
///
/// Turns are processed one at a time, in submission order, so a later
/// question sees the replies to earlier ones in its history. The worker exits
/// once every handle has been dropped and the backlog is drained, so awaiting
/// its `JoinHandle` after shutdown finishes every accepted turn.
#[derive(Clone)]
pub struct TurnQueue {
    sender: mpsc::UnboundedSender<i64>,
}

impl TurnQueue {
    /// Start the worker task
    pub fn spawn(dispatcher: Arc<Dispatcher>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<i64>();

        let worker = tokio::spawn(async move {
            while let Some(message_id) = receiver.recv().await {
                match dispatcher.handle_id(message_id).await {
                    Ok(TurnOutcome::Replied(reply)) => {
                        debug!("Turn for message {} produced message {}", message_id, reply.id)
                    }
                    Ok(outcome) => debug!("Turn for message {}: {:?}", message_id, outcome),
                    Err(e) => error!("Turn for message {} failed: {}", message_id, e),
                }
            }
            info!("Turn queue closed");
        });

        (Self { sender }, worker)
    }

    /// Queue a stored message for handling
    pub fn submit(&self, message_id: i64) -> Result<()> {
        self.sender
            .send(message_id)
            .map_err(|_| Error::Other("turn queue is closed".to_string()))
    }

    /// Queue every principal message left without a reply by an earlier run
    pub async fn resubmit_unanswered(&self, dispatcher: &Dispatcher) -> Result<usize> {
        let pending = dispatcher.unanswered().await?;
        for &message_id in &pending {
            self.submit(message_id)?;
        }
        if !pending.is_empty() {
            info!("Resubmitted {} unanswered messages", pending.len());
        }
        Ok(pending.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::FakeLlmClient;
    use crate::agent::{AgentProfile, AgentRegistry, Router};
    use crate::store::{InMemoryStore, MessageStore, NewMessage};
    use crate::tools::ToolRunner;

    async fn setup(replies: Vec<&str>) -> (Arc<Dispatcher>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store.ensure_room(1).await.unwrap();

        let client = Arc::new(FakeLlmClient::new(replies));
        let registry = AgentRegistry::from_profiles(
            &[AgentProfile::engineering_manager()],
            &ToolRunner::new(),
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
        (Arc::new(dispatcher), store)
    }

    #[tokio::test]
    async fn test_turns_run_in_order() {
        let (dispatcher, store) = setup(vec![
            "Engineering Manager",
            "Release is on track.",
            "Engineering Manager",
            "Two bugs left.",
        ])
        .await;

        let first = dispatcher.post("Sam", "Release?", 1).await.unwrap();
        let second = dispatcher.post("Sam", "Bugs?", 1).await.unwrap();

        let (queue, worker) = TurnQueue::spawn(dispatcher);
        queue.submit(first.id).unwrap();
        queue.submit(second.id).unwrap();
        queue.submit(first.id).unwrap();
        drop(queue);
        worker.await.unwrap();

        let texts: Vec<String> = store.list(1).await.unwrap().into_iter().map(|m| m.text).collect();
        assert_eq!(
            texts,
            vec!["Release?", "Bugs?", "Release is on track.", "Two bugs left."]
        );
    }

    #[tokio::test]
    async fn test_turn_submitted_before_shutdown_is_answered() {
        let (dispatcher, store) = setup(vec!["Engineering Manager", "Release is on track."]).await;

        let (queue, worker) = TurnQueue::spawn(dispatcher.clone());
        let question = dispatcher.post("Sam", "Release?", 1).await.unwrap();
        queue.submit(question.id).unwrap();

        // Closing the last sender lets the worker drain instead of dropping the turn
        drop(queue);
        worker.await.unwrap();

        let messages = store.list(1).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text, "Release is on track.");
        assert!(dispatcher.unanswered().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resubmit_unanswered_after_restart() {
        let (dispatcher, store) = setup(vec![
            "Two bugs left.",
            "Engineering Manager",
            "Two open roles.",
        ])
        .await;

        let answered = dispatcher.post("Sam", "Release?", 1).await.unwrap();
        store.tag_recipient(answered.id, "Engineering Manager").await.unwrap();
        let reply = store
            .append(NewMessage::new("Michael", "On track.", "Engineering Manager", 1))
            .await
            .unwrap();
        store.tag_recipient(reply.id, "CEO").await.unwrap();

        let cut_short = dispatcher.post("Sam", "Bugs?", 1).await.unwrap();
        store.tag_recipient(cut_short.id, "Engineering Manager").await.unwrap();
        dispatcher.post("Sam", "Hiring?", 1).await.unwrap();

        let (queue, worker) = TurnQueue::spawn(dispatcher.clone());
        assert_eq!(queue.resubmit_unanswered(&dispatcher).await.unwrap(), 2);
        drop(queue);
        worker.await.unwrap();

        let texts: Vec<String> = store.list(1).await.unwrap().into_iter().map(|m| m.text).collect();
        assert_eq!(
            texts,
            vec!["Release?", "On track.", "Bugs?", "Hiring?", "Two bugs left.", "Two open roles."]
        );
        assert!(dispatcher.unanswered().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_turn_does_not_stop_worker() {
        let (dispatcher, store) = setup(vec!["Marketing Manager", "Engineering Manager", "Fine."]).await;

        let bad = dispatcher.post("Sam", "Campaign?", 1).await.unwrap();
        let good = dispatcher.post("Sam", "Release?", 1).await.unwrap();
        let note = store
            .append(NewMessage::new("Michael", "FYI", "Engineering Manager", 1))
            .await
            .unwrap();

        let (queue, worker) = TurnQueue::spawn(dispatcher);
        for id in [bad.id, note.id, good.id, 999] {
            queue.submit(id).unwrap();
        }
        drop(queue);
        worker.await.unwrap();

        let messages = store.list(1).await.unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3].text, "Fine.");
        assert_eq!(messages[3].recipient_role.as_deref(), Some("CEO"));
    }
}
