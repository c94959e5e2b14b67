//! Calendar and mailbox backends consumed by the built-in tools

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// A calendar entry in the queried window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub subject: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// Summary of a mailbox message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailSummary {
    pub subject: String,
    pub sender: String,
    pub is_read: bool,
}

/// Source of calendar events
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<CalendarEvent>>;
}

/// Source of mailbox messages
#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<MailSummary>>;
}
