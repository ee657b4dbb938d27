//! # SqliteConnector
//!
//! Lazily opened, process-wide SQLite pool. Constructed explicitly and
//! shared through `Arc`, so tests can run any number of isolated stores.

use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use domains::{Result, StoreError};
use secrecy::{ExposeSecret, SecretString};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Schema embedded at compile time.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub struct SqliteConnector {
    url: SecretString,
    max_connections: u32,
    pool: OnceCell<SqlitePool>,
    attempts: AtomicU32,
}

impl SqliteConnector {
    pub fn new(url: SecretString, max_connections: u32) -> Self {
        Self {
            url,
            max_connections: max_connections.max(1),
            pool: OnceCell::new(),
            attempts: AtomicU32::new(0),
        }
    }

    /// A private database that lives as long as this connector.
    pub fn in_memory() -> Self {
        Self::new(SecretString::from(String::from("sqlite::memory:")), 1)
    }

    /// Returns the shared pool, opening it on first use.
    ///
    /// Callers arriving while the first attempt is in flight wait for it
    /// instead of opening a second pool. A failed attempt leaves the
    /// connector unopened, so the next call tries again.
    pub async fn connect(&self) -> Result<SqlitePool> {
        self.pool.get_or_try_init(|| self.open()).await.cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.pool.initialized()
    }

    /// Number of times a pool was actually opened (or attempted).
    pub fn connect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            debug!("sqlite pool closed");
        }
    }

    async fn open(&self) -> Result<SqlitePool> {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let url = self.url.expose_secret();
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::database("connect", e))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to `:memory:` is its own database, so pin one.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(self.max_connections)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::database("connect", e))?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::database("migrate", e))?;

        info!(attempt, in_memory, "sqlite pool ready");
        Ok(pool)
    }
}
