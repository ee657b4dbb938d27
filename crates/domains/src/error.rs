//! # StoreError
//!
//! Centralized error handling for the clipboard session store.
//! Every store operation fails with one of these variants; expected races
//! (version conflicts, item already gone) are reported as values instead.

use serde::Serialize;
use thiserror::Error;

/// The primary error type for all session store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No session matches the given id or code.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The session exists but has been archived (logically deleted).
    #[error("session has been archived: {0}")]
    SessionArchived(String),

    /// Every candidate code collided with an existing session.
    #[error("failed to generate a unique session code after {attempts} attempts")]
    SessionCodeGeneration { attempts: u32 },

    /// The calling device does not own the item or did not create the session.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed input (e.g., unknown item type, empty device id).
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Backend I/O failure, tagged with the store operation that hit it.
    #[error("database error during {operation}: {details}")]
    Database { operation: String, details: String },
}

/// A specialized Result type for session store logic.
pub type Result<T> = std::result::Result<T, StoreError>;

/// JSON body handed to the HTTP layer for a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub name: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl StoreError {
    /// Wraps a backend failure. Used by every adapter so the failing
    /// operation is always named.
    pub fn database(operation: impl Into<String>, details: impl std::fmt::Display) -> Self {
        Self::Database {
            operation: operation.into(),
            details: details.to_string(),
        }
    }

    /// Wire name of the error class, as consumed by clients.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "SessionNotFoundError",
            Self::SessionArchived(_) => "SessionArchivedException",
            Self::SessionCodeGeneration { .. } => "SessionCodeGenerationError",
            Self::Unauthorized(_) => "UnauthorizedError",
            Self::ValidationError(_) => "ValidationError",
            Self::Database { .. } => "DatabaseError",
        }
    }

    /// HTTP status the router maps this error to.
    ///
    /// Archived sessions answer 404: clients only need the distinct `name`
    /// to tell "expired" apart from "never existed".
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SessionNotFound(_) | Self::SessionArchived(_) => 404,
            Self::SessionCodeGeneration { .. } => 500,
            Self::Unauthorized(_) => 403,
            Self::ValidationError(_) => 400,
            Self::Database { .. } => 503,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (error, details) = match self {
            Self::Database { operation, details } => {
                (format!("database error during {operation}"), Some(details.clone()))
            }
            other => (other.to_string(), None),
        };
        ErrorBody {
            name: self.name(),
            error,
            details,
        }
    }

    /// True for the two "session is gone" variants.
    pub fn is_missing_session(&self) -> bool {
        matches!(self, Self::SessionNotFound(_) | Self::SessionArchived(_))
    }
}
