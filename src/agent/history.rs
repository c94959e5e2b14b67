//! Conversation view - an agent's private history with one other role.
//!
//! The view is rebuilt from the message store on every response and never
//! persisted. Only messages authored by one of the two roles and addressed to
//! the other belong to it.

use crate::store::Message;

use super::message::ChatMessage;

/// Who authored a history entry, from the agent's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Own,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    pub speaker: Speaker,
    pub text: String,
}

/// Ordered exchange between an agent's role and another role
#[derive(Debug, Clone, Default)]
pub struct ConversationView {
    entries: Vec<ConversationEntry>,
}

impl ConversationView {
    /// Build the view from stored messages, oldest first.
    ///
    /// Messages that were not exchanged between `own_role` and `other_role`
    /// are skipped.
    pub fn between(own_role: &str, other_role: &str, messages: &[Message]) -> Self {
        let entries = messages
            .iter()
            .filter(|m| m.is_between(own_role, other_role))
            .map(|m| ConversationEntry {
                speaker: if m.role == own_role {
                    Speaker::Own
                } else {
                    Speaker::Other
                },
                text: m.text.clone(),
            })
            .collect();

        Self { entries }
    }

    /// Append a message from the other party
    pub fn push_other(&mut self, text: impl Into<String>) {
        self.entries.push(ConversationEntry {
            speaker: Speaker::Other,
            text: text.into(),
        });
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prompt sequence: the system prompt followed by one entry per message.
    pub fn to_prompt(&self, system_prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.entries.len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(self.entries.iter().map(|e| match e.speaker {
            Speaker::Own => ChatMessage::assistant(e.text.clone()),
            Speaker::Other => ChatMessage::user(e.text.clone()),
        }));
        messages
    }
}
