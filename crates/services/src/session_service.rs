//! # SessionService
//!
//! The `ClipboardStore` implementation. Storage-agnostic: every backend
//! plugs in through `SessionRepository`, so observable behavior is the
//! same whichever one is configured.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domains::{
    is_valid_code, ClipboardItem, ClipboardStore, ItemType, Result, Session, SessionRepository,
    StoreError, UpdateOutcome,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::code_generator::CodeGenerator;
use crate::concurrency::{self, Mutation};

/// Tunables for the service.
#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    /// Code draws before `createSession` gives up.
    pub code_attempts: u32,
    /// Document write retries after losing a race to another writer.
    pub write_attempts: u32,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            code_attempts: CodeGenerator::DEFAULT_ATTEMPTS,
            write_attempts: 5,
        }
    }
}

pub struct SessionService<R: ?Sized> {
    repo: Arc<R>,
    codes: CodeGenerator,
    write_attempts: u32,
}

impl<R> SessionService<R>
where
    R: SessionRepository + ?Sized,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self::with_options(repo, ServiceOptions::default())
    }

    pub fn with_options(repo: Arc<R>, options: ServiceOptions) -> Self {
        Self {
            repo,
            codes: CodeGenerator::new(options.code_attempts),
            write_attempts: options.write_attempts.max(1),
        }
    }

    /// Replaces the code generator (e.g., a scripted source in tests).
    pub fn with_code_generator(mut self, codes: CodeGenerator) -> Self {
        self.codes = codes;
        self
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    fn require_device(device_id: &str) -> Result<()> {
        if device_id.trim().is_empty() {
            return Err(StoreError::ValidationError("device id must not be empty".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<R> ClipboardStore for SessionService<R>
where
    R: SessionRepository + ?Sized,
{
    #[instrument(skip(self))]
    async fn create_session(&self, creator_device_id: &str) -> Result<Session> {
        Self::require_device(creator_device_id)?;
        let session = self
            .codes
            .allocate(self.repo.as_ref(), creator_device_id, Utc::now())
            .await?;
        info!(session_id = %session.id, code = %session.code, "session created");
        Ok(session)
    }

    async fn get_session_by_id(&self, id: Uuid) -> Result<Session> {
        concurrency::load_active(self.repo.as_ref(), id).await
    }

    async fn get_session_by_code(&self, code: &str) -> Result<Session> {
        if !is_valid_code(code) {
            return Err(StoreError::SessionNotFound(code.to_owned()));
        }
        match self.repo.find_by_code(code).await? {
            None => Err(StoreError::SessionNotFound(code.to_owned())),
            Some(session) if session.is_archived => Err(StoreError::SessionArchived(code.to_owned())),
            Some(session) => Ok(session),
        }
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
        match self.get_session_by_id(id).await {
            Ok(session) => Ok(Some(session)),
            Err(err) if err.is_missing_session() => Ok(None),
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self))]
    async fn delete_session(&self, id: Uuid) -> Result<bool> {
        concurrency::load_active(self.repo.as_ref(), id).await?;
        if self.repo.archive(id).await? {
            info!(session_id = %id, "session archived");
            return Ok(true);
        }
        // Someone else archived it between our read and write.
        Err(StoreError::SessionArchived(id.to_string()))
    }

    async fn add_item(
        &self,
        session_id: Uuid,
        kind: ItemType,
        content: String,
        device_id: &str,
        device_name: &str,
    ) -> Result<ClipboardItem> {
        Self::require_device(device_id)?;
        let item = ClipboardItem::new(kind, content, device_id.to_owned(), device_name.to_owned(), Utc::now());
        debug!(%session_id, item_id = %item.id, kind = %kind, "adding item");

        concurrency::read_modify_write(self.repo.as_ref(), "add_item", session_id, self.write_attempts, |session| {
            Ok(Mutation::Write(concurrency::append_item(session, item.clone(), Utc::now())))
        })
        .await
    }

    async fn update_item(
        &self,
        session_id: Uuid,
        item_id: Uuid,
        new_content: String,
        expected_version: u64,
        device_id: Option<&str>,
    ) -> Result<UpdateOutcome> {
        let outcome = concurrency::read_modify_write(
            self.repo.as_ref(),
            "update_item",
            session_id,
            self.write_attempts,
            |session| {
                concurrency::apply_item_update(session, item_id, &new_content, expected_version, device_id, Utc::now())
            },
        )
        .await?;

        if let UpdateOutcome::Conflict(conflict) = &outcome {
            debug!(
                %session_id,
                %item_id,
                expected_version,
                server_version = conflict.server_version,
                "item update rejected by version check"
            );
        }
        Ok(outcome)
    }

    async fn delete_item(&self, session_id: Uuid, item_id: Uuid, device_id: &str) -> Result<bool> {
        concurrency::read_modify_write(self.repo.as_ref(), "delete_item", session_id, self.write_attempts, |session| {
            Ok(concurrency::remove_owned_item(session, item_id, device_id, Utc::now()))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn wipe_session(&self, session_id: Uuid, device_id: &str) -> Result<()> {
        concurrency::read_modify_write(self.repo.as_ref(), "wipe_session", session_id, self.write_attempts, |session| {
            concurrency::clear_items(session, device_id, Utc::now())
        })
        .await?;
        info!(%session_id, "session wiped");
        Ok(())
    }

    async fn remove_my_items(&self, session_id: Uuid, device_id: &str) -> Result<bool> {
        concurrency::read_modify_write(self.repo.as_ref(), "remove_my_items", session_id, self.write_attempts, |session| {
            Ok(concurrency::remove_items_of(session, device_id, Utc::now()))
        })
        .await
    }
}
