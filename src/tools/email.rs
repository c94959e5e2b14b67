//! Email search tool

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Error;
use crate::Result;

use super::providers::{MailProvider, MailSummary};
use super::{json_schema, required_str, Tool, ToolOutput};

const DEFAULT_LIMIT: usize = 25;
const MAX_LIMIT: usize = 50;

/// Search the CEO's mailbox by keyword
pub struct EmailSearchTool {
    provider: Arc<dyn MailProvider>,
}

impl EmailSearchTool {
    pub fn new(provider: Arc<dyn MailProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Tool for EmailSearchTool {
    fn name(&self) -> &str {
        "email_search"
    }

    fn description(&self) -> String {
        "Search the CEO's mailbox for messages matching a keyword. Returns subject, sender and read status."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json_schema(
            json!({
                "keyword": {
                    "type": "string",
                    "description": "Word or phrase to search for"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of messages (default 25, max 50)"
                }
            }),
            &["keyword"],
        )
    }

    async fn run(&self, args: Value) -> Result<ToolOutput> {
        let name = self.name();
        let keyword = required_str(name, &args, "keyword")?.trim();
        if keyword.is_empty() {
            return Err(Error::malformed(name, "'keyword' cannot be empty"));
        }

        let limit = match args.get("limit") {
            None | Some(Value::Null) => DEFAULT_LIMIT,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| Error::malformed(name, "'limit' must be a positive integer"))?
                as usize,
        }
        .clamp(1, MAX_LIMIT);

        let messages = self.provider.search(keyword, limit).await?;
        Ok(ToolOutput::Structured(json!({
            "keyword": keyword,
            "messages": messages,
        })))
    }

    fn format(&self, output: &ToolOutput) -> String {
        let value = match output {
            ToolOutput::Structured(value) => value,
            ToolOutput::Text(text) => return text.clone(),
        };

        let keyword = value["keyword"].as_str().unwrap_or_default();
        let messages: Vec<MailSummary> =
            serde_json::from_value(value["messages"].clone()).unwrap_or_default();

        if messages.is_empty() {
            return format!("No messages found for \"{}\".", keyword);
        }

        let mut lines = vec![format!("{} messages for \"{}\":", messages.len(), keyword)];
        for m in &messages {
            let status = if m.is_read { "Read" } else { "Unread" };
            lines.push(format!("- [{}] {} (from {})", status, m.subject, m.sender));
        }
        lines.join("\n")
    }
}
