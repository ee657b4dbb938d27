//! # Domain Models
//!
//! These structs represent the core entities of the clipboard session store.
//! We use UUID v7 for time-ordered, globally unique identification.
//! Field names serialize in camelCase, which is also the persisted shape.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Kind of payload carried by a clipboard item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Text,
    Image,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Text => "text",
            ItemType::Image => "image",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ItemType::Text),
            "image" => Ok(ItemType::Image),
            other => Err(StoreError::ValidationError(format!(
                "unknown item type '{other}'"
            ))),
        }
    }
}

/// One stored clipboard entry. Lives only inside its parent session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardItem {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ItemType,
    /// Text, or an encoded image. Opaque to the store.
    pub content: String,
    /// Optimistic-concurrency token; starts at 1, +1 per successful update.
    pub version: u64,
    /// Owning client. Never changes after creation.
    pub device_id: String,
    pub device_name: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl ClipboardItem {
    pub fn new(
        kind: ItemType,
        content: String,
        device_id: String,
        device_name: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            content,
            version: 1,
            device_id,
            device_name,
            created_at: now,
            last_modified: now,
        }
    }

    pub fn is_owned_by(&self, device_id: &str) -> bool {
        self.device_id == device_id
    }
}

/// A logical clipboard addressed by a 6-digit code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub code: String,
    /// Insertion order is the canonical order.
    pub items: Vec<ClipboardItem>,
    /// Bumped on every structural mutation.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub is_archived: bool,
    /// The only device allowed to wipe the session.
    pub created_by: String,
}

impl Session {
    pub fn new(code: String, created_by: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            code,
            items: Vec::new(),
            version: 1,
            created_at: now,
            last_modified: now,
            is_archived: false,
            created_by,
        }
    }

    pub fn find_item(&self, item_id: Uuid) -> Option<&ClipboardItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn find_item_mut(&mut self, item_id: Uuid) -> Option<&mut ClipboardItem> {
        self.items.iter_mut().find(|item| item.id == item_id)
    }

    /// Bookkeeping for a structural mutation.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.last_modified = now;
    }

    /// Items ordered by most recent modification first. Ties keep insertion order.
    pub fn items_by_recency(&self) -> Vec<&ClipboardItem> {
        let mut items: Vec<&ClipboardItem> = self.items.iter().collect();
        items.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        items
    }
}

/// Current authoritative state returned when an update loses a version race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionConflict {
    pub server_version: u64,
    pub server_content: String,
}

impl VersionConflict {
    /// The 409 response body.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": "Version conflict",
            "serverVersion": self.server_version,
            "serverContent": self.server_content,
        })
    }
}

/// Result of a versioned item update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "UpdateResponse")]
pub enum UpdateOutcome {
    Updated(ClipboardItem),
    /// The item is not (or no longer) in the session.
    NotFound,
    Conflict(VersionConflict),
}

impl UpdateOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UpdateOutcome::Updated(_))
    }
}

/// Wire shape of [`UpdateOutcome`]: `{success, item?, conflict?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<ClipboardItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<VersionConflict>,
}

impl From<UpdateOutcome> for UpdateResponse {
    fn from(outcome: UpdateOutcome) -> Self {
        match outcome {
            UpdateOutcome::Updated(item) => Self {
                success: true,
                item: Some(item),
                conflict: None,
            },
            UpdateOutcome::NotFound => Self {
                success: false,
                item: None,
                conflict: None,
            },
            UpdateOutcome::Conflict(conflict) => Self {
                success: false,
                item: None,
                conflict: Some(conflict),
            },
        }
    }
}
