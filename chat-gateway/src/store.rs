use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::StoreError;
use crate::models::{Message, MessageId, NewMessage, UserId};

/// Persistence the gateway needs for chat messages.
///
/// Calls are synchronous; each one completes before the calling connection
/// handles its next event.
pub trait MessageStore: Send + Sync {
    /// Insert a message with `is_edited = false` and return the stored row.
    fn create_message(&self, new: NewMessage) -> Result<Message, StoreError>;

    fn find_message(&self, id: MessageId) -> Result<Option<Message>, StoreError>;

    /// Replace the text and mark the message edited. Returns false when no row matched.
    fn update_message(&self, id: MessageId, text: &str) -> Result<bool, StoreError>;

    /// Returns false when no row matched.
    fn delete_message(&self, id: MessageId) -> Result<bool, StoreError>;

    /// Latest `limit` messages exchanged between two users, oldest first.
    fn conversation(&self, a: UserId, b: UserId, limit: usize)
        -> Result<Vec<Message>, StoreError>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sender_id INTEGER NOT NULL,
        receiver_id INTEGER NOT NULL,
        text TEXT NOT NULL,
        is_edited INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_messages_participants ON messages(sender_id, receiver_id);
    CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at);
";

const SELECT_COLUMNS: &str = "id, sender_id, receiver_id, text, is_edited, created_at";

/// SQLite-backed [`MessageStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let millis: i64 = row.get(5)?;
    let created_at = DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(5, millis))?;

    Ok(Message {
        id: MessageId(row.get(0)?),
        sender_id: UserId(row.get(1)?),
        receiver_id: UserId(row.get(2)?),
        text: row.get(3)?,
        is_edited: row.get(4)?,
        created_at,
    })
}

impl MessageStore for SqliteStore {
    fn create_message(&self, new: NewMessage) -> Result<Message, StoreError> {
        // Millisecond precision so the broadcast row equals what a later read returns
        let created_at = Utc::now().trunc_subsecs(3);

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (sender_id, receiver_id, text, is_edited, created_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![
                new.sender_id.0,
                new.receiver_id.0,
                &new.text,
                created_at.timestamp_millis()
            ],
        )?;
        let id = MessageId(conn.last_insert_rowid());
        debug!(%id, sender = %new.sender_id, receiver = %new.receiver_id, "message stored");

        Ok(Message {
            id,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            text: new.text,
            is_edited: false,
            created_at,
        })
    }

    fn find_message(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        let conn = self.lock()?;
        let message = conn
            .query_row(
                &format!("SELECT {} FROM messages WHERE id = ?1", SELECT_COLUMNS),
                [id.0],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    fn update_message(&self, id: MessageId, text: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE messages SET text = ?1, is_edited = 1 WHERE id = ?2",
            params![text, id.0],
        )?;
        Ok(changed > 0)
    }

    fn delete_message(&self, id: MessageId) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM messages WHERE id = ?1", [id.0])?;
        Ok(changed > 0)
    }

    fn conversation(
        &self,
        a: UserId,
        b: UserId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {cols} FROM (
                SELECT {cols} FROM messages
                WHERE (sender_id = ?1 AND receiver_id = ?2)
                   OR (sender_id = ?2 AND receiver_id = ?1)
                ORDER BY id DESC
                LIMIT ?3
             ) ORDER BY id ASC",
            cols = SELECT_COLUMNS
        ))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let messages = stmt
            .query_map(params![a.0, b.0, limit], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }
}
