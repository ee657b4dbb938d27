//! # storage-adapters
//!
//! `SessionRepository` implementations. The SQLite document store is the
//! durable backend (feature `db-sqlite`); the file-backed map is the
//! ephemeral one used for development and tests.

pub mod file;

#[cfg(feature = "db-sqlite")]
pub mod connection;
#[cfg(feature = "db-sqlite")]
pub mod sqlite;

pub use file::FileSessionRepository;

#[cfg(feature = "db-sqlite")]
pub use connection::SqliteConnector;
#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteSessionRepository;

/// How long a session record is retained before the backend expires it.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

pub fn default_retention() -> chrono::Duration {
    chrono::Duration::days(DEFAULT_RETENTION_DAYS)
}
