//! Calendar tool - the CEO's schedule for a time range

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Error;
use crate::Result;

use super::providers::{CalendarEvent, CalendarProvider};
use super::{json_schema, required_str, Tool, ToolOutput};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Look up calendar events between two instants
pub struct CalendarTool {
    provider: Arc<dyn CalendarProvider>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Schedule {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    events: Vec<CalendarEvent>,
}

impl CalendarTool {
    pub fn new(provider: Arc<dyn CalendarProvider>) -> Self {
        Self { provider }
    }
}

/// Parse RFC 3339, or a naive date/time taken as UTC.
fn parse_time(tool: &str, key: &str, raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(Error::malformed(tool, format!("'{}' is not a date/time: {:?}", key, raw)))
}

#[async_trait]
impl Tool for CalendarTool {
    fn name(&self) -> &str {
        "calendar_events"
    }

    fn description(&self) -> String {
        let today = Utc::now().format("%Y-%m-%d (%A)");
        format!(
            "Get the CEO's calendar events between two times (UTC). Today is {} in UTC.",
            today
        )
    }

    fn parameters(&self) -> Value {
        json_schema(
            json!({
                "start_time": {
                    "type": "string",
                    "description": "Start of the range, ISO 8601 (e.g. Monday 09:00 of this work week)"
                },
                "end_time": {
                    "type": "string",
                    "description": "End of the range, ISO 8601 (e.g. Friday 17:00 of this work week)"
                }
            }),
            &["start_time", "end_time"],
        )
    }

    async fn run(&self, args: Value) -> Result<ToolOutput> {
        let name = self.name();
        let start = parse_time(name, "start_time", required_str(name, &args, "start_time")?)?;
        let end = parse_time(name, "end_time", required_str(name, &args, "end_time")?)?;

        if end < start {
            return Err(Error::malformed(name, "end_time is before start_time"));
        }

        let events = self.provider.events(start, end).await?;
        let schedule = Schedule { start, end, events };
        Ok(ToolOutput::Structured(serde_json::to_value(schedule)?))
    }

    fn format(&self, output: &ToolOutput) -> String {
        let value = match output {
            ToolOutput::Structured(value) => value,
            ToolOutput::Text(text) => return text.clone(),
        };
        let Ok(schedule) = serde_json::from_value::<Schedule>(value.clone()) else {
            return value.to_string();
        };

        let range = format!(
            "{} to {}",
            schedule.start.format("%Y-%m-%d %H:%M"),
            schedule.end.format("%Y-%m-%d %H:%M")
        );
        if schedule.events.is_empty() {
            return format!("No events from {}.", range);
        }

        let mut lines = vec![format!("Events from {} (UTC):", range)];
        for event in &schedule.events {
            let mut line = format!("- {} - {}: {}", event.start, event.end, event.subject);
            if let Some(location) = &event.location {
                line.push_str(&format!(" @ {}", location));
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedCalendar {
        events: Vec<CalendarEvent>,
        seen: Mutex<Option<(DateTime<Utc>, DateTime<Utc>)>>,
    }

    #[async_trait]
    impl CalendarProvider for FixedCalendar {
        async fn events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<CalendarEvent>> {
            *self.seen.lock().unwrap() = Some((start, end));
            Ok(self.events.clone())
        }
    }

    fn calendar(events: Vec<CalendarEvent>) -> (CalendarTool, Arc<FixedCalendar>) {
        let provider = Arc::new(FixedCalendar {
            events,
            seen: Mutex::new(None),
        });
        (CalendarTool::new(provider.clone()), provider)
    }

    #[tokio::test]
    async fn test_run_and_format() {
        let (tool, provider) = calendar(vec![CalendarEvent {
            subject: "Meeting with Engineering Manager".to_string(),
            start: "2024-03-04T09:00:00".to_string(),
            end: "2024-03-04T10:00:00".to_string(),
            location: Some("Room 4".to_string()),
        }]);

        let output = tool
            .run(json!({"start_time": "2024-03-04T09:00:00Z", "end_time": "2024-03-08 17:00"}))
            .await
            .unwrap();
        let text = tool.format(&output);

        assert!(text.starts_with("Events from 2024-03-04 09:00 to 2024-03-08 17:00"));
        assert!(text.contains("Meeting with Engineering Manager @ Room 4"));

        let (start, end) = provider.seen.lock().unwrap().unwrap();
        assert_eq!(start.to_rfc3339(), "2024-03-04T09:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2024-03-08T17:00:00+00:00");
    }

    #[tokio::test]
    async fn test_empty_schedule() {
        let (tool, _) = calendar(vec![]);
        let output = tool
            .run(json!({"start_time": "2024-03-04", "end_time": "2024-03-05"}))
            .await
            .unwrap();
        assert_eq!(tool.format(&output), "No events from 2024-03-04 00:00 to 2024-03-05 00:00.");
    }

    #[tokio::test]
    async fn test_rejects_reversed_range() {
        let (tool, _) = calendar(vec![]);
        let result = tool
            .run(json!({"start_time": "2024-03-08T17:00:00Z", "end_time": "2024-03-04T09:00:00Z"}))
            .await;
        assert!(matches!(result, Err(Error::MalformedArguments { .. })));
    }

    #[tokio::test]
    async fn test_rejects_garbage_time() {
        let (tool, _) = calendar(vec![]);
        let result = tool
            .run(json!({"start_time": "next monday", "end_time": "2024-03-04T09:00:00Z"}))
            .await;
        assert!(matches!(result, Err(Error::MalformedArguments { .. })));
    }

    #[test]
    fn test_description_uses_utc_date() {
        let (tool, _) = calendar(vec![]);
        let before = Utc::now().format("%Y-%m-%d").to_string();
        let description = tool.description();
        let after = Utc::now().format("%Y-%m-%d").to_string();

        assert!(description.contains(&before) || description.contains(&after));
        assert!(description.contains("in UTC"));
    }
}
