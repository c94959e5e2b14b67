//! Microsoft Graph REST client for calendar and mail lookups.
//!
//! Authentication is out of band: the client is handed an already issued
//! bearer token.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::GraphConfig;
use crate::error::Error;
use crate::Result;

use super::providers::{CalendarEvent, CalendarProvider, MailProvider, MailSummary};

/// Graph API client
#[derive(Clone)]
pub struct GraphClient {
    base_url: String,
    access_token: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphEvent {
    subject: Option<String>,
    start: Option<GraphDateTime>,
    end: Option<GraphDateTime>,
    location: Option<GraphLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDateTime {
    date_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphLocation {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    subject: Option<String>,
    from: Option<GraphRecipient>,
    is_read: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: GraphEmailAddress,
}

#[derive(Debug, Deserialize)]
struct GraphEmailAddress {
    name: Option<String>,
    address: Option<String>,
}

impl GraphClient {
    pub fn new(config: &GraphConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| Error::Config(format!("invalid Graph URL: {}", e)))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<Page<T>> {
        if self.access_token.is_empty() {
            return Err(Error::Config("Graph access token is not configured".to_string()));
        }

        debug!("Graph request: {}", url);
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .header("Prefer", "outlook.timezone=\"UTC\"")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            return Err(Error::Other(format!("Graph API error {status}: {body}")));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl CalendarProvider for GraphClient {
    async fn events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<CalendarEvent>> {
        let mut url = self.endpoint("/me/calendarView")?;
        url.query_pairs_mut()
            .append_pair("startDateTime", &start.to_rfc3339_opts(SecondsFormat::Secs, true))
            .append_pair("endDateTime", &end.to_rfc3339_opts(SecondsFormat::Secs, true))
            .append_pair("$select", "subject,start,end,location")
            .append_pair("$orderby", "start/dateTime");

        let page: Page<GraphEvent> = self.get(url).await?;
        Ok(page
            .value
            .into_iter()
            .map(|e| CalendarEvent {
                subject: e.subject.unwrap_or_else(|| "(no subject)".to_string()),
                start: e.start.map(|d| d.date_time).unwrap_or_default(),
                end: e.end.map(|d| d.date_time).unwrap_or_default(),
                location: e
                    .location
                    .and_then(|l| l.display_name)
                    .filter(|name| !name.is_empty()),
            })
            .collect())
    }
}

#[async_trait]
impl MailProvider for GraphClient {
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<MailSummary>> {
        let mut url = self.endpoint("/me/messages")?;
        url.query_pairs_mut()
            .append_pair("$search", &format!("\"{}\"", keyword.replace('"', "")))
            .append_pair("$select", "subject,from,isRead")
            .append_pair("$top", &limit.to_string());

        let page: Page<GraphMessage> = self.get(url).await?;
        Ok(page
            .value
            .into_iter()
            .map(|m| MailSummary {
                subject: m.subject.unwrap_or_else(|| "(no subject)".to_string()),
                sender: m
                    .from
                    .and_then(|f| f.email_address.name.or(f.email_address.address))
                    .unwrap_or_else(|| "NONE".to_string()),
                is_read: m.is_read.unwrap_or(false),
            })
            .collect())
    }
}
