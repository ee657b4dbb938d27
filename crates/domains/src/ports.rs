//! # Core Traits (Ports)
//!
//! `ClipboardStore` is what the router talks to. `SessionRepository` is what
//! any storage backend must implement to be plugged under it.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ClipboardItem, ItemType, Session, UpdateOutcome};

/// The session data-service contract.
///
/// Every returned value is an owned snapshot; mutating it never reaches
/// stored state.
#[async_trait]
pub trait ClipboardStore: Send + Sync {
    /// Creates an empty session with a fresh 6-digit code.
    async fn create_session(&self, creator_device_id: &str) -> Result<Session>;

    /// Fails with `SessionNotFound` or `SessionArchived`.
    async fn get_session_by_id(&self, id: Uuid) -> Result<Session>;

    /// Fails with `SessionNotFound` or `SessionArchived`.
    async fn get_session_by_code(&self, code: &str) -> Result<Session>;

    /// Collapses not-found and archived into `None`.
    async fn get_session(&self, id: Uuid) -> Result<Option<Session>>;

    /// Archives the session. A second call fails with `SessionArchived`.
    async fn delete_session(&self, id: Uuid) -> Result<bool>;

    async fn add_item(
        &self,
        session_id: Uuid,
        kind: ItemType,
        content: String,
        device_id: &str,
        device_name: &str,
    ) -> Result<ClipboardItem>;

    /// Compare-and-swap on the item version. Ownership is only checked
    /// when `device_id` is given; a mismatch fails with `Unauthorized`.
    async fn update_item(
        &self,
        session_id: Uuid,
        item_id: Uuid,
        new_content: String,
        expected_version: u64,
        device_id: Option<&str>,
    ) -> Result<UpdateOutcome>;

    /// `false` when the item is absent or owned by another device.
    async fn delete_item(&self, session_id: Uuid, item_id: Uuid, device_id: &str) -> Result<bool>;

    /// Clears every item. Only the creating device may do this.
    async fn wipe_session(&self, session_id: Uuid, device_id: &str) -> Result<()>;

    /// `false` when the device had no items in the session.
    async fn remove_my_items(&self, session_id: Uuid, device_id: &str) -> Result<bool>;
}

/// Document-level persistence contract: one record per session, items
/// embedded. Lookups return archived records too; expired ones never.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Stores a new session. Returns `false` if its code is already held.
    async fn insert(&self, session: &Session) -> Result<bool>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>>;

    async fn find_by_code(&self, code: &str) -> Result<Option<Session>>;

    /// True if any retained record, archived or not, holds this code.
    async fn code_exists(&self, code: &str) -> Result<bool>;

    /// Overwrites the stored document only if its version still equals
    /// `expected_version` and it is not archived. Returns `false` otherwise.
    async fn replace(&self, session: &Session, expected_version: u64) -> Result<bool>;

    /// Flips `is_archived` to true. Returns `false` if the record is absent
    /// or was already archived.
    async fn archive(&self, id: Uuid) -> Result<bool>;
}
