//! SQLite-backed message store

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{check_retag, lock, Message, MessageStore, MonotonicClock, NewMessage, Room};
use crate::error::Error;
use crate::Result;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS meeting_rooms (
        id INTEGER PRIMARY KEY
    );
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_name TEXT NOT NULL,
        text TEXT NOT NULL,
        role TEXT NOT NULL,
        recipient_role TEXT,
        timestamp TEXT NOT NULL,
        meeting_room_id INTEGER NOT NULL REFERENCES meeting_rooms(id)
    );
    CREATE INDEX IF NOT EXISTS idx_messages_room ON messages(meeting_room_id, timestamp);
    CREATE INDEX IF NOT EXISTS idx_messages_roles ON messages(role, recipient_role);
";

const MESSAGE_COLUMNS: &str =
    "id, user_name, text, role, recipient_role, timestamp, meeting_room_id";

/// SQLite message store (thread-safe via Arc<Mutex>)
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<MonotonicClock>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening message store at {:?}", path.as_ref());
        Self::init(Connection::open(path.as_ref())?)
    }

    /// In-memory SQLite database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.execute_batch(SCHEMA)?;

        // Keep the clock ahead of anything persisted by a previous run
        let last: Option<String> =
            conn.query_row("SELECT MAX(timestamp) FROM messages", [], |row| row.get(0))?;
        let last = last.map(|s| parse_timestamp(&s)).transpose().map_err(Error::Store)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock: Arc::new(MonotonicClock::starting_after(last)),
        })
    }

    /// Run a closure against the connection off the async executor.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &MonotonicClock) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let clock = Arc::clone(&self.clock);

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn);
            f(&conn, &clock)
        })
        .await
        .map_err(|e| Error::Store(format!("store task failed: {}", e)))?
    }

    fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
        let timestamp: String = row.get(5)?;
        let timestamp = parse_timestamp(&timestamp).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into())
        })?;

        Ok(Message {
            id: row.get(0)?,
            user_name: row.get(1)?,
            text: row.get(2)?,
            role: row.get(3)?,
            recipient_role: row.get(4)?,
            timestamp,
            meeting_room_id: row.get(6)?,
        })
    }

    fn get_sync(conn: &Connection, id: i64) -> Result<Option<Message>> {
        let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_message)
            .optional()?)
    }

    fn room_exists(conn: &Connection, id: i64) -> Result<bool> {
        Ok(conn
            .query_row("SELECT 1 FROM meeting_rooms WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?
            .is_some())
    }

    fn list_sync(conn: &Connection, room_id: i64) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE meeting_room_id = ?1 ORDER BY timestamp, id",
            MESSAGE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let messages = stmt
            .query_map(params![room_id], Self::row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp {:?}: {}", s, e))
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // Fixed-width micros with 'Z' sorts lexicographically in time order
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append(&self, message: NewMessage) -> Result<Message> {
        self.with_conn(move |conn, clock| {
            if !Self::room_exists(conn, message.meeting_room_id)? {
                return Err(Error::RoomNotFound(message.meeting_room_id));
            }

            let timestamp = clock.next();
            conn.execute(
                "INSERT INTO messages (user_name, text, role, recipient_role, timestamp, meeting_room_id)
                 VALUES (?1, ?2, ?3, NULL, ?4, ?5)",
                params![
                    &message.user_name,
                    &message.text,
                    &message.role,
                    format_timestamp(&timestamp),
                    message.meeting_room_id,
                ],
            )?;

            let id = conn.last_insert_rowid();
            debug!("Inserted message {} into room {}", id, message.meeting_room_id);

            Ok(Message {
                id,
                user_name: message.user_name,
                text: message.text,
                role: message.role,
                recipient_role: None,
                timestamp,
                meeting_room_id: message.meeting_room_id,
            })
        })
        .await
    }

    async fn get(&self, id: i64) -> Result<Option<Message>> {
        self.with_conn(move |conn, _| Self::get_sync(conn, id)).await
    }

    async fn list(&self, room_id: i64) -> Result<Vec<Message>> {
        self.with_conn(move |conn, _| {
            if !Self::room_exists(conn, room_id)? {
                return Err(Error::RoomNotFound(room_id));
            }
            Self::list_sync(conn, room_id)
        })
        .await
    }

    async fn list_between(&self, role_a: &str, role_b: &str) -> Result<Vec<Message>> {
        let role_a = role_a.to_owned();
        let role_b = role_b.to_owned();

        self.with_conn(move |conn, _| {
            let sql = format!(
                "SELECT {} FROM messages
                 WHERE (role = ?1 AND recipient_role = ?2)
                    OR (role = ?2 AND recipient_role = ?1)
                 ORDER BY timestamp, id",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let messages = stmt
                .query_map(params![&role_a, &role_b], Self::row_to_message)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(messages)
        })
        .await
    }

    async fn tag_recipient(&self, message_id: i64, role: &str) -> Result<Message> {
        let role = role.to_owned();

        self.with_conn(move |conn, _| {
            let mut message = Self::get_sync(conn, message_id)?
                .ok_or_else(|| Error::Store(format!("message {} not found", message_id)))?;

            check_retag(&message, &role)?;
            conn.execute(
                "UPDATE messages SET recipient_role = ?1 WHERE id = ?2",
                params![&role, message_id],
            )?;

            message.recipient_role = Some(role);
            Ok(message)
        })
        .await
    }

    async fn rooms(&self) -> Result<Vec<Room>> {
        self.with_conn(|conn, _| {
            let mut stmt = conn.prepare("SELECT id FROM meeting_rooms ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, i64>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            ids.into_iter()
                .map(|id| {
                    Ok(Room {
                        id,
                        messages: Self::list_sync(conn, id)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn room(&self, id: i64) -> Result<Option<Room>> {
        self.with_conn(move |conn, _| {
            if !Self::room_exists(conn, id)? {
                return Ok(None);
            }
            Ok(Some(Room {
                id,
                messages: Self::list_sync(conn, id)?,
            }))
        })
        .await
    }

    async fn create_room(&self, id: i64) -> Result<Room> {
        self.with_conn(move |conn, _| {
            if Self::room_exists(conn, id)? {
                return Err(Error::RoomExists(id));
            }
            conn.execute("INSERT INTO meeting_rooms (id) VALUES (?1)", params![id])?;
            info!("Created meeting room {}", id);
            Ok(Room {
                id,
                messages: Vec::new(),
            })
        })
        .await
    }
}
