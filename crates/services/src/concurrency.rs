//! Optimistic concurrency for session mutations.
//!
//! Two levels of versioning are at play:
//! - the item `version` is the caller-facing compare-and-swap token. A stale
//!   token yields a [`VersionConflict`] and is never retried here;
//! - the session `version` guards the document write. A write that lost a
//!   race against another writer is re-run on fresh state.

use chrono::{DateTime, Utc};
use domains::{
    ClipboardItem, Result, Session, SessionRepository, StoreError, UpdateOutcome, VersionConflict,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// What a rule decided to do with the loaded session.
#[derive(Debug, PartialEq, Eq)]
pub enum Mutation<T> {
    /// The session changed and must be written back.
    Write(T),
    /// Nothing changed; the result goes straight to the caller.
    Skip(T),
}

/// Loads a session that may be mutated.
pub async fn load_active<R>(repo: &R, session_id: Uuid) -> Result<Session>
where
    R: SessionRepository + ?Sized,
{
    match repo.find_by_id(session_id).await? {
        None => Err(StoreError::SessionNotFound(session_id.to_string())),
        Some(session) if session.is_archived => {
            Err(StoreError::SessionArchived(session_id.to_string()))
        }
        Some(session) => Ok(session),
    }
}

/// Runs `apply` against the current document and writes the result back
/// with a compare-and-swap on the session version.
///
/// `apply` may run more than once, so it must be a pure function of the
/// session it receives.
pub async fn read_modify_write<R, T, F>(
    repo: &R,
    operation: &'static str,
    session_id: Uuid,
    max_attempts: u32,
    mut apply: F,
) -> Result<T>
where
    R: SessionRepository + ?Sized,
    F: FnMut(&mut Session) -> Result<Mutation<T>> + Send,
    T: Send,
{
    for attempt in 1..=max_attempts {
        let mut session = load_active(repo, session_id).await?;
        let expected = session.version;

        match apply(&mut session)? {
            Mutation::Skip(value) => return Ok(value),
            Mutation::Write(value) => {
                if repo.replace(&session, expected).await? {
                    debug!(operation, %session_id, version = session.version, "session written");
                    return Ok(value);
                }
                warn!(operation, %session_id, attempt, "session changed underneath write, retrying");
            }
        }
    }

    Err(StoreError::database(
        operation,
        format!("session {session_id} kept changing during {max_attempts} write attempts"),
    ))
}

pub fn append_item(session: &mut Session, item: ClipboardItem, now: DateTime<Utc>) -> ClipboardItem {
    session.items.push(item.clone());
    session.touch(now);
    item
}

/// The versioned item update.
pub fn apply_item_update(
    session: &mut Session,
    item_id: Uuid,
    new_content: &str,
    expected_version: u64,
    device_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Mutation<UpdateOutcome>> {
    let Some(item) = session.find_item_mut(item_id) else {
        return Ok(Mutation::Skip(UpdateOutcome::NotFound));
    };

    if let Some(device_id) = device_id {
        if !item.is_owned_by(device_id) {
            return Err(StoreError::Unauthorized(format!(
                "device {device_id} does not own item {item_id}"
            )));
        }
    }

    if item.version != expected_version {
        return Ok(Mutation::Skip(UpdateOutcome::Conflict(VersionConflict {
            server_version: item.version,
            server_content: item.content.clone(),
        })));
    }

    item.content = new_content.to_owned();
    item.version += 1;
    item.last_modified = now;
    let updated = item.clone();
    session.touch(now);

    Ok(Mutation::Write(UpdateOutcome::Updated(updated)))
}

/// Removes one item if `device_id` owns it.
pub fn remove_owned_item(
    session: &mut Session,
    item_id: Uuid,
    device_id: &str,
    now: DateTime<Utc>,
) -> Mutation<bool> {
    let Some(index) = session
        .items
        .iter()
        .position(|item| item.id == item_id && item.is_owned_by(device_id))
    else {
        return Mutation::Skip(false);
    };

    session.items.remove(index);
    session.touch(now);
    Mutation::Write(true)
}

/// Clears the session. Only its creator may do this.
pub fn clear_items(session: &mut Session, device_id: &str, now: DateTime<Utc>) -> Result<Mutation<()>> {
    if session.created_by != device_id {
        return Err(StoreError::Unauthorized(format!(
            "device {device_id} did not create session {}",
            session.code
        )));
    }

    session.items.clear();
    session.touch(now);
    Ok(Mutation::Write(()))
}

pub fn remove_items_of(session: &mut Session, device_id: &str, now: DateTime<Utc>) -> Mutation<bool> {
    let before = session.items.len();
    session.items.retain(|item| !item.is_owned_by(device_id));
    if session.items.len() == before {
        return Mutation::Skip(false);
    }

    session.touch(now);
    Mutation::Write(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{ItemType, MockSessionRepository};

    fn session_with_item(owner: &str) -> (Session, Uuid) {
        let now = Utc::now();
        let mut session = Session::new("123456".into(), "d1".into(), now);
        let item = ClipboardItem::new(ItemType::Text, "hello".into(), owner.into(), "Mac".into(), now);
        let id = item.id;
        append_item(&mut session, item, now);
        (session, id)
    }

    #[test]
    fn update_with_matching_version_bumps_both_versions() {
        let (mut session, id) = session_with_item("d1");
        let before = session.version;

        let outcome = apply_item_update(&mut session, id, "A", 1, Some("d1"), Utc::now()).unwrap();
        let item = match outcome {
            Mutation::Write(UpdateOutcome::Updated(item)) => item,
            other => panic!("expected a write, got {other:?}"),
        };
        assert_eq!(item.version, 2);
        assert_eq!(item.content, "A");
        assert_eq!(session.version, before + 1);
        assert_eq!(session.find_item(id).unwrap(), &item);
    }

    #[test]
    fn stale_version_reports_server_state_and_changes_nothing() {
        let (mut session, id) = session_with_item("d1");
        apply_item_update(&mut session, id, "A", 1, Some("d1"), Utc::now()).unwrap();
        let snapshot = session.clone();

        let outcome = apply_item_update(&mut session, id, "B", 1, Some("d1"), Utc::now()).unwrap();
        assert_eq!(
            outcome,
            Mutation::Skip(UpdateOutcome::Conflict(VersionConflict {
                server_version: 2,
                server_content: "A".into(),
            }))
        );
        assert_eq!(session, snapshot);
    }

    #[test]
    fn update_by_other_device_is_unauthorized() {
        let (mut session, id) = session_with_item("d1");
        let snapshot = session.clone();

        let err = apply_item_update(&mut session, id, "B", 1, Some("d2"), Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized(_)));
        assert_eq!(session, snapshot);
    }

    #[test]
    fn update_without_device_skips_ownership_check() {
        let (mut session, id) = session_with_item("d1");
        let outcome = apply_item_update(&mut session, id, "B", 1, None, Utc::now()).unwrap();
        assert!(matches!(outcome, Mutation::Write(UpdateOutcome::Updated(_))));
    }

    #[test]
    fn update_of_missing_item_is_not_a_conflict() {
        let (mut session, _) = session_with_item("d1");
        let outcome = apply_item_update(&mut session, Uuid::now_v7(), "B", 1, Some("d1"), Utc::now()).unwrap();
        assert_eq!(outcome, Mutation::Skip(UpdateOutcome::NotFound));
    }

    #[test]
    fn delete_requires_ownership() {
        let (mut session, id) = session_with_item("d1");
        assert_eq!(remove_owned_item(&mut session, id, "d2", Utc::now()), Mutation::Skip(false));
        assert_eq!(session.items.len(), 1);
        assert_eq!(remove_owned_item(&mut session, id, "d1", Utc::now()), Mutation::Write(true));
        assert!(session.items.is_empty());
    }

    #[test]
    fn wipe_is_reserved_for_the_creator() {
        let (mut session, _) = session_with_item("d2");
        assert!(matches!(
            clear_items(&mut session, "d2", Utc::now()),
            Err(StoreError::Unauthorized(_))
        ));
        assert_eq!(session.items.len(), 1);

        let before = session.version;
        assert_eq!(clear_items(&mut session, "d1", Utc::now()).unwrap(), Mutation::Write(()));
        assert!(session.items.is_empty());
        assert_eq!(session.version, before + 1);
    }

    #[test]
    fn remove_mine_only_touches_own_items() {
        let (mut session, _) = session_with_item("d1");
        let other = ClipboardItem::new(ItemType::Text, "x".into(), "d2".into(), "PC".into(), Utc::now());
        append_item(&mut session, other, Utc::now());

        assert_eq!(remove_items_of(&mut session, "d3", Utc::now()), Mutation::Skip(false));
        assert_eq!(remove_items_of(&mut session, "d2", Utc::now()), Mutation::Write(true));
        assert_eq!(session.items.len(), 1);
        assert_eq!(session.items[0].device_id, "d1");
    }

    #[tokio::test]
    async fn lost_document_race_reruns_on_fresh_state() {
        let (stored, _) = session_with_item("d1");
        let id = stored.id;

        let mut repo = MockSessionRepository::new();
        let s = stored.clone();
        repo.expect_find_by_id().times(2).returning(move |_| Ok(Some(s.clone())));
        let mut calls = 0;
        repo.expect_replace().times(2).returning(move |_, expected| {
            calls += 1;
            assert_eq!(expected, 2);
            Ok(calls == 2)
        });

        let mut runs = 0;
        let added = read_modify_write(&repo, "add_item", id, 5, |session| {
            runs += 1;
            session.touch(Utc::now());
            Ok(Mutation::Write(session.version))
        })
        .await
        .unwrap();

        assert_eq!(runs, 2);
        assert_eq!(added, 3);
    }

    #[tokio::test]
    async fn endless_contention_becomes_database_error() {
        let (stored, _) = session_with_item("d1");
        let id = stored.id;

        let mut repo = MockSessionRepository::new();
        repo.expect_find_by_id().times(3).returning(move |_| Ok(Some(stored.clone())));
        repo.expect_replace().times(3).returning(|_, _| Ok(false));

        let err = read_modify_write(&repo, "wipe_session", id, 3, |session| {
            session.touch(Utc::now());
            Ok(Mutation::Write(()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, StoreError::Database { ref operation, .. } if operation == "wipe_session"));
    }

    #[tokio::test]
    async fn archived_sessions_are_never_mutated() {
        let (mut stored, _) = session_with_item("d1");
        stored.is_archived = true;
        let id = stored.id;

        let mut repo = MockSessionRepository::new();
        repo.expect_find_by_id().returning(move |_| Ok(Some(stored.clone())));
        repo.expect_replace().never();

        let err = read_modify_write(&repo, "add_item", id, 5, |_| Ok(Mutation::Write(())))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SessionArchived(_)));
    }
}
