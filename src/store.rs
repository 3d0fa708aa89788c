use crate::{chat::ChatMessage, entity::Role};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, Row, SqlitePool};
use std::{
    collections::HashMap,
    path::Path,
    str::FromStr,
    sync::Mutex,
};
use uuid::Uuid;

/// Key holding the capped conversation snapshot.
pub const HISTORY_KEY: &str = "ir-chat-messages";
/// Key holding the session id handed to the completion transport.
pub const SESSION_KEY: &str = "ir-chat-session";
/// Maximum number of messages kept in the snapshot.
pub const HISTORY_LIMIT: usize = 10;

/// Per-client string storage, the widget's equivalent of browser local storage.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and create if missing) the database file backing the store.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());
        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool, mostly useful with in-memory databases.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize database schema")?;

        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read key")?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .context("Failed to write key")?;

        Ok(())
    }
}

/// Denormalized snapshot entry. `timestamp` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: i64,
}

/// Reads the snapshot. A missing key is an empty history; unparsable JSON is an error.
pub async fn load_history(store: &dyn KvStore) -> Result<Vec<StoredMessage>> {
    let Some(raw) = store.get(HISTORY_KEY).await? else {
        return Ok(Vec::new());
    };

    let entries: Vec<StoredMessage> =
        serde_json::from_str(&raw).context("Failed to parse stored messages")?;

    Ok(entries)
}

/// Last `HISTORY_LIMIT` messages with text, oldest first.
pub fn snapshot(messages: &[ChatMessage]) -> Vec<StoredMessage> {
    let with_text: Vec<StoredMessage> = messages
        .iter()
        .filter_map(|m| {
            let text = m.text();
            if text.is_empty() {
                return None;
            }
            Some(StoredMessage {
                id: m.id.clone(),
                role: m.role,
                text,
                timestamp: m.created_at.timestamp_millis(),
            })
        })
        .collect();

    let skip = with_text.len().saturating_sub(HISTORY_LIMIT);
    with_text.into_iter().skip(skip).collect()
}

/// Rewrites the snapshot wholesale from the full message sequence.
pub async fn save_history(store: &dyn KvStore, messages: &[ChatMessage]) -> Result<usize> {
    let entries = snapshot(messages);
    let json = serde_json::to_string(&entries)?;
    store.set(HISTORY_KEY, &json).await?;
    Ok(entries.len())
}

/// Returns the stored session id, minting and persisting one on first use.
pub async fn load_or_assign_session_id(store: &dyn KvStore) -> Result<String> {
    if let Some(id) = store.get(SESSION_KEY).await? {
        if !id.trim().is_empty() {
            return Ok(id);
        }
    }

    let id = Uuid::new_v4().to_string();
    store
        .set(SESSION_KEY, &id)
        .await
        .context("Failed to persist session id")?;
    Ok(id)
}
