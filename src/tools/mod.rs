//! Tools module - agent capabilities
//!
//! Tools are external lookups an agent can make while answering, such as
//! reading the CEO's calendar or searching the mailbox. Every tool offers the
//! same three operations: describe itself (name + parameter schema), `run`
//! with validated arguments, and `format` the raw result for the model.

mod calendar;
mod email;
mod graph;
mod providers;
mod runner;

pub use calendar::CalendarTool;
pub use email::EmailSearchTool;
pub use graph::GraphClient;
pub use providers::{CalendarEvent, CalendarProvider, MailProvider, MailSummary};
pub use runner::{ResolvedCall, ToolDefinition, ToolRunner};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Error;
use crate::Result;

/// Raw result of a tool run, before formatting
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Structured(Value),
}

/// Tool trait - interface for all agent tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in function calls
    fn name(&self) -> &str;

    /// Description of what the tool does
    fn description(&self) -> String;

    /// JSON Schema for parameters
    fn parameters(&self) -> Value;

    /// Execute the tool with arguments already checked against the schema
    async fn run(&self, args: Value) -> Result<ToolOutput>;

    /// Render a raw result as text for the model
    fn format(&self, output: &ToolOutput) -> String {
        match output {
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }

    /// Convert to tool definition for LLM
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description(),
            parameters: self.parameters(),
        }
    }
}

/// Build an object schema from its properties and required keys
pub fn json_schema(properties: Value, required: &[&str]) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Fetch a required string argument
pub(crate) fn required_str<'a>(tool: &str, args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::malformed(tool, format!("'{}' must be a string", key)))
}

/// Fixed-result tool for testing
#[cfg(test)]
pub struct DummyTool {
    pub name: String,
    pub result: String,
}

#[cfg(test)]
#[async_trait]
impl Tool for DummyTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        "Dummy tool for testing".to_string()
    }

    fn parameters(&self) -> Value {
        json_schema(serde_json::json!({}), &[])
    }

    async fn run(&self, _args: Value) -> Result<ToolOutput> {
        Ok(ToolOutput::Text(self.result.clone()))
    }
}
