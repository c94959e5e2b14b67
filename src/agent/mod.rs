//! Agent module - core agent logic.
//!
//! This module contains:
//! - Prompt message types exchanged with the model
//! - LLM client trait and implementations
//! - Agent profiles and the bounded tool-call loop
//! - The router that picks which agent answers
//!
//! # Adding a New LLM Provider
//!
//! See [`llm::ProviderRegistry`] for instructions.

mod history;
mod loop_impl;
mod message;
mod profile;
mod registry;
mod router;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use history::{ConversationEntry, ConversationView, Speaker};
pub use llm::{LlmClient, LlmResponse, OpenAiClient, ProviderRegistry, Usage};
pub use loop_impl::{Agent, DEFAULT_TOOL_CALL_LIMIT, FALLBACK_REPLY};
pub use message::{ChatMessage, Role, ToolCallRequest};
pub use profile::AgentProfile;
pub use registry::AgentRegistry;
pub use router::Router;
