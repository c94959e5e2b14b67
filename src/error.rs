//! Error types for boardroom

use thiserror::Error;

/// Result type alias for boardroom operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the meeting room
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("No message store is bound to agent '{0}'")]
    StoreUnavailable(String),

    #[error("Router returned a role that matches no agent: {0:?}")]
    InvalidRoutingResponse(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Malformed arguments for tool '{tool}': {reason}")]
    MalformedArguments { tool: String, reason: String },

    #[error("Tool '{tool}' failed: {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Meeting room {0} not found")]
    RoomNotFound(i64),

    #[error("Meeting room {0} already exists")]
    RoomExists(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap a backend failure as a tool execution error.
    pub fn tool_execution(tool: &str, reason: impl std::fmt::Display) -> Self {
        Error::ToolExecution {
            tool: tool.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Build a malformed-arguments error for `tool`.
    pub fn malformed(tool: &str, reason: impl std::fmt::Display) -> Self {
        Error::MalformedArguments {
            tool: tool.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
