//! Boardroom - multi-agent meeting room backend
//!
//! This library routes the CEO's messages to role agents (an assistant, an
//! engineering manager) that answer with an LLM and a bounded tool-call loop,
//! and keeps the conversation in a persistent message store.

pub mod agent;
pub mod app;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod server;
pub mod store;
pub mod tools;
pub mod ui;

pub use error::{Error, Result};
