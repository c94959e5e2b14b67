//! Message store - the append-only meeting room log
//!
//! Rooms hold an ordered sequence of [`Message`]s. Timestamps are assigned by
//! the store at append time through a [`MonotonicClock`], so concurrent writers
//! still produce one consistent order for conversation reconstruction.

mod sqlite;

pub use sqlite::SqliteStore;

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Error;
use crate::Result;

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    /// Display name of the author (e.g. "Amy")
    pub user_name: String,
    pub text: String,
    /// Role of the author (e.g. "CEO Assistant")
    pub role: String,
    /// Role the message is addressed to, once known
    pub recipient_role: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub meeting_room_id: i64,
}

impl Message {
    /// True when the message was authored by `a` and addressed to `b`, or the reverse.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        match self.recipient_role.as_deref() {
            Some(recipient) => {
                (self.role == a && recipient == b) || (self.role == b && recipient == a)
            }
            None => false,
        }
    }
}

/// A message before the store has assigned its id and timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub user_name: String,
    pub text: String,
    pub role: String,
    pub meeting_room_id: i64,
}

impl NewMessage {
    pub fn new(
        user_name: impl Into<String>,
        text: impl Into<String>,
        role: impl Into<String>,
        meeting_room_id: i64,
    ) -> Self {
        Self {
            user_name: user_name.into(),
            text: text.into(),
            role: role.into(),
            meeting_room_id,
        }
    }
}

/// A meeting room and its ordered messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    pub messages: Vec<Message>,
}

/// Message store trait - interface for the meeting room log
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message, assigning id and timestamp
    async fn append(&self, message: NewMessage) -> Result<Message>;

    /// Fetch a single message
    async fn get(&self, id: i64) -> Result<Option<Message>>;

    /// All messages of a room, oldest first
    async fn list(&self, room_id: i64) -> Result<Vec<Message>>;

    /// Messages authored by one role and addressed to the other, oldest first
    async fn list_between(&self, role_a: &str, role_b: &str) -> Result<Vec<Message>>;

    /// Record the role a message is addressed to
    async fn tag_recipient(&self, message_id: i64, role: &str) -> Result<Message>;

    /// All rooms with their messages
    async fn rooms(&self) -> Result<Vec<Room>>;

    /// A single room with its messages
    async fn room(&self, id: i64) -> Result<Option<Room>>;

    /// Create an empty room
    async fn create_room(&self, id: i64) -> Result<Room>;

    /// Return the room, creating it when missing
    async fn ensure_room(&self, id: i64) -> Result<Room> {
        match self.room(id).await? {
            Some(room) => Ok(room),
            None => self.create_room(id).await,
        }
    }
}

/// Hands out strictly increasing UTC timestamps.
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    /// Start after an already persisted timestamp.
    pub fn starting_after(last: Option<DateTime<Utc>>) -> Self {
        Self {
            last: Mutex::new(last),
        }
    }

    /// Next timestamp, at microsecond resolution.
    pub fn next(&self) -> DateTime<Utc> {
        let mut last = lock(&self.last);
        let now = truncate_micros(Utc::now());
        let next = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        next
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let micros = ts.timestamp_micros();
    DateTime::from_timestamp_micros(micros).unwrap_or(ts)
}

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Store mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Check a one-time recipient tag; re-tagging with the same role is a no-op.
pub(crate) fn check_retag(message: &Message, role: &str) -> Result<()> {
    match message.recipient_role.as_deref() {
        Some(existing) if existing != role => Err(Error::Store(format!(
            "message {} is already addressed to '{}'",
            message.id, existing
        ))),
        _ => Ok(()),
    }
}

#[derive(Default)]
struct MemoryInner {
    rooms: BTreeSet<i64>,
    messages: Vec<Message>,
}

/// In-memory store for tests and ephemeral runs
pub struct InMemoryStore {
    inner: Mutex<MemoryInner>,
    clock: MonotonicClock,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
            clock: MonotonicClock::new(),
        }
    }

    fn room_of(inner: &MemoryInner, id: i64) -> Room {
        Room {
            id,
            messages: inner
                .messages
                .iter()
                .filter(|m| m.meeting_room_id == id)
                .cloned()
                .collect(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn append(&self, message: NewMessage) -> Result<Message> {
        let mut inner = lock(&self.inner);
        if !inner.rooms.contains(&message.meeting_room_id) {
            return Err(Error::RoomNotFound(message.meeting_room_id));
        }

        // Messages are pushed in timestamp order, so the Vec stays sorted.
        let stored = Message {
            id: inner.messages.len() as i64 + 1,
            user_name: message.user_name,
            text: message.text,
            role: message.role,
            recipient_role: None,
            timestamp: self.clock.next(),
            meeting_room_id: message.meeting_room_id,
        };
        inner.messages.push(stored.clone());
        debug!("Appended message {} to room {}", stored.id, stored.meeting_room_id);
        Ok(stored)
    }

    async fn get(&self, id: i64) -> Result<Option<Message>> {
        let inner = lock(&self.inner);
        Ok(inner.messages.iter().find(|m| m.id == id).cloned())
    }

    async fn list(&self, room_id: i64) -> Result<Vec<Message>> {
        let inner = lock(&self.inner);
        if !inner.rooms.contains(&room_id) {
            return Err(Error::RoomNotFound(room_id));
        }
        Ok(Self::room_of(&inner, room_id).messages)
    }

    async fn list_between(&self, role_a: &str, role_b: &str) -> Result<Vec<Message>> {
        let inner = lock(&self.inner);
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.is_between(role_a, role_b))
            .cloned()
            .collect())
    }

    async fn tag_recipient(&self, message_id: i64, role: &str) -> Result<Message> {
        let mut inner = lock(&self.inner);
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| Error::Store(format!("message {} not found", message_id)))?;

        check_retag(message, role)?;
        message.recipient_role = Some(role.to_string());
        Ok(message.clone())
    }

    async fn rooms(&self) -> Result<Vec<Room>> {
        let inner = lock(&self.inner);
        Ok(inner.rooms.iter().map(|id| Self::room_of(&inner, *id)).collect())
    }

    async fn room(&self, id: i64) -> Result<Option<Room>> {
        let inner = lock(&self.inner);
        Ok(inner.rooms.contains(&id).then(|| Self::room_of(&inner, id)))
    }

    async fn create_room(&self, id: i64) -> Result<Room> {
        let mut inner = lock(&self.inner);
        if !inner.rooms.insert(id) {
            return Err(Error::RoomExists(id));
        }
        Ok(Room {
            id,
            messages: Vec::new(),
        })
    }
}
