//! # SqliteSessionRepository
//!
//! Durable backend. Each session is a single row whose `items` column holds
//! the embedded item list as JSON, so every mutation is a one-row
//! read-modify-write guarded by the session `version`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use domains::{ClipboardItem, Result, Session, SessionRepository, StoreError};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use crate::connection::SqliteConnector;

const SELECT_SESSION: &str = "SELECT id, code, items, version, created_at, last_modified, is_archived, created_by \
     FROM clipboard_sessions";

pub struct SqliteSessionRepository {
    connector: Arc<SqliteConnector>,
    retention: Duration,
}

// Helpers for the TEXT-encoded columns
fn text_to_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| StoreError::database("decode_session", e))
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn session_from_row(row: &SqliteRow) -> Result<Session> {
    let decode = |e: sqlx::Error| StoreError::database("decode_session", e);

    let items: String = row.try_get("items").map_err(decode)?;
    let items: Vec<ClipboardItem> =
        serde_json::from_str(&items).map_err(|e| StoreError::database("decode_session", e))?;
    let version: i64 = row.try_get("version").map_err(decode)?;

    Ok(Session {
        id: text_to_uuid(&row.try_get::<String, _>("id").map_err(decode)?)?,
        code: row.try_get("code").map_err(decode)?,
        items,
        version: u64::try_from(version).map_err(|e| StoreError::database("decode_session", e))?,
        created_at: row.try_get("created_at").map_err(decode)?,
        last_modified: row.try_get("last_modified").map_err(decode)?,
        is_archived: row.try_get("is_archived").map_err(decode)?,
        created_by: row.try_get("created_by").map_err(decode)?,
    })
}

fn items_json(session: &Session, operation: &str) -> Result<String> {
    serde_json::to_string(&session.items).map_err(|e| StoreError::database(operation, e))
}

impl SqliteSessionRepository {
    pub fn new(connector: Arc<SqliteConnector>, retention: Duration) -> Self {
        Self { connector, retention }
    }

    pub fn connector(&self) -> &Arc<SqliteConnector> {
        &self.connector
    }

    async fn find_one(&self, operation: &str, column: &str, value: String) -> Result<Option<Session>> {
        let pool = self.connector.connect().await?;
        let row = sqlx::query(&format!("{SELECT_SESSION} WHERE {column} = ? AND expires_at > ?"))
            .bind(value)
            .bind(millis(Utc::now()))
            .fetch_optional(&pool)
            .await
            .map_err(|e| StoreError::database(operation, e))?;

        row.as_ref().map(session_from_row).transpose()
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn insert(&self, session: &Session) -> Result<bool> {
        let pool = self.connector.connect().await?;
        let result = sqlx::query(
            "INSERT INTO clipboard_sessions \
             (id, code, items, version, created_at, last_modified, is_archived, created_by, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(&session.code)
        .bind(items_json(session, "insert_session")?)
        .bind(session.version as i64)
        .bind(session.created_at)
        .bind(session.last_modified)
        .bind(session.is_archived)
        .bind(&session.created_by)
        .bind(millis(session.created_at + self.retention))
        .execute(&pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                debug!(code = %session.code, "session code already held");
                Ok(false)
            }
            Err(e) => Err(StoreError::database("insert_session", e)),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>> {
        self.find_one("find_session_by_id", "id", id.to_string()).await
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Session>> {
        self.find_one("find_session_by_code", "code", code.to_owned()).await
    }

    async fn code_exists(&self, code: &str) -> Result<bool> {
        let pool = self.connector.connect().await?;
        let held: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM clipboard_sessions WHERE code = ? AND expires_at > ?",
        )
        .bind(code)
        .bind(millis(Utc::now()))
        .fetch_one(&pool)
        .await
        .map_err(|e| StoreError::database("code_exists", e))?;

        Ok(held > 0)
    }

    async fn replace(&self, session: &Session, expected_version: u64) -> Result<bool> {
        let pool = self.connector.connect().await?;
        let result = sqlx::query(
            "UPDATE clipboard_sessions SET items = ?, version = ?, last_modified = ? \
             WHERE id = ? AND version = ? AND is_archived = 0 AND expires_at > ?",
        )
        .bind(items_json(session, "replace_session")?)
        .bind(session.version as i64)
        .bind(session.last_modified)
        .bind(session.id.to_string())
        .bind(expected_version as i64)
        .bind(millis(Utc::now()))
        .execute(&pool)
        .await
        .map_err(|e| StoreError::database("replace_session", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn archive(&self, id: Uuid) -> Result<bool> {
        let pool = self.connector.connect().await?;
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE clipboard_sessions SET is_archived = 1, last_modified = ? \
             WHERE id = ? AND is_archived = 0 AND expires_at > ?",
        )
        .bind(now)
        .bind(id.to_string())
        .bind(millis(now))
        .execute(&pool)
        .await
        .map_err(|e| StoreError::database("archive_session", e))?;

        Ok(result.rows_affected() == 1)
    }
}
