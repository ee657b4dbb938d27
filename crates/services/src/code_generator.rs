//! Session code allocation.
//!
//! Codes are 6 ASCII digits drawn uniformly from `100000..=999999`, checked
//! against the backend and claimed by inserting the session. The number of
//! round-trips is bounded; running out is a hard error.

use chrono::{DateTime, Utc};
use domains::{Result, Session, SessionRepository, StoreError};
use rand::Rng;
use tracing::{debug, warn};

pub const CODE_MIN: u32 = 100_000;
pub const CODE_MAX: u32 = 999_999;

/// Produces candidate codes. Swappable so tests can force collisions.
pub trait CodeSource: Send + Sync {
    fn next_code(&self) -> String;
}

/// Uniform random draw over the whole code space.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeSource;

impl CodeSource for RandomCodeSource {
    fn next_code(&self) -> String {
        rand::rng().random_range(CODE_MIN..=CODE_MAX).to_string()
    }
}

pub struct CodeGenerator {
    source: Box<dyn CodeSource>,
    max_attempts: u32,
}

impl CodeGenerator {
    pub const DEFAULT_ATTEMPTS: u32 = 10;

    pub fn new(max_attempts: u32) -> Self {
        Self::with_source(Box::new(RandomCodeSource), max_attempts)
    }

    pub fn with_source(source: Box<dyn CodeSource>, max_attempts: u32) -> Self {
        Self {
            source,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Creates and stores a new session under a code no other retained
    /// session holds.
    ///
    /// An insert rejected because another writer claimed the same code in
    /// the meantime counts as a collision.
    pub async fn allocate<R>(&self, repo: &R, created_by: &str, now: DateTime<Utc>) -> Result<Session>
    where
        R: SessionRepository + ?Sized,
    {
        for attempt in 1..=self.max_attempts {
            let code = self.source.next_code();
            if repo.code_exists(&code).await? {
                debug!(attempt, code = %code, "session code collision");
                continue;
            }

            let session = Session::new(code, created_by.to_owned(), now);
            if repo.insert(&session).await? {
                return Ok(session);
            }
            debug!(attempt, code = %session.code, "session code claimed concurrently");
        }

        warn!(attempts = self.max_attempts, "gave up allocating a session code");
        Err(StoreError::SessionCodeGeneration {
            attempts: self.max_attempts,
        })
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATTEMPTS)
    }
}
