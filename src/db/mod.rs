pub mod models;

use models::{Message, MessageKind, Role};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Result, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Local SQLite store: a cache of the chat log plus the settings table.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(app_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(app_dir).ok();
        let db_path = app_dir.join("nutri-chat.db");
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                kind TEXT NOT NULL CHECK (kind IN ('text', 'image')),
                text TEXT NOT NULL,
                image_ref TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at);

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ── Messages ──

    /// Stores a message. Re-adding an id that is already present is a no-op,
    /// so replaying history does not duplicate rows.
    pub fn add_message(&self, message: &Message) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO messages (id, role, kind, text, image_ref, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id,
                message.role.as_str(),
                message.kind.as_str(),
                message.text,
                message.image_ref,
                message.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_messages(&self) -> Result<Vec<Message>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, role, kind, text, image_ref, created_at FROM messages ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map([], message_from_row)?;
        rows.collect()
    }

    pub fn message_count(&self) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ── Settings ──

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let result = conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );
        match result {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }
}

fn message_from_row(row: &Row<'_>) -> Result<Message> {
    let role: String = row.get(1)?;
    let kind: String = row.get(2)?;
    Ok(Message {
        id: row.get(0)?,
        role: Role::parse(&role).ok_or_else(|| bad_enum(1, &role))?,
        kind: MessageKind::parse(&kind).ok_or_else(|| bad_enum(2, &kind))?,
        text: row.get(3)?,
        image_ref: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn bad_enum(column: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        Type::Text,
        format!("unexpected value '{}'", value).into(),
    )
}
