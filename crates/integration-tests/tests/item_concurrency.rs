// Item versioning, conflict reporting and concurrent writers.

use domains::{ItemType, StoreError, UpdateOutcome};
use integration_tests::all_backends;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_versions_are_monotonic() {
    for (backend, store) in all_backends() {
        let session = store.create_session("d1").await.unwrap();
        let item = store.add_item(session.id, ItemType::Text, "v1".into(), "d1", "Mac").await.unwrap();

        for expected in 1..=4u64 {
            let outcome = store
                .update_item(session.id, item.id, format!("v{}", expected + 1), expected, Some("d1"))
                .await
                .unwrap();
            match outcome {
                UpdateOutcome::Updated(updated) => {
                    assert_eq!(updated.version, expected + 1, "{backend}");
                    assert_eq!(updated.created_at, item.created_at, "{backend}: createdAt is fixed");
                }
                other => panic!("{backend}: unexpected {other:?}"),
            }
        }

        let stored = store.get_session_by_id(session.id).await.unwrap();
        assert_eq!(stored.items[0].version, 5);
        assert_eq!(stored.items[0].content, "v5");
        assert_eq!(stored.version, 6, "{backend}: one add and four updates");
    }
}

#[tokio::test]
async fn test_conflict_then_resolve() {
    for (backend, store) in all_backends() {
        let session = store.create_session("d1").await.unwrap();
        let item = store.add_item(session.id, ItemType::Text, "original".into(), "d1", "Mac").await.unwrap();

        let first = store.update_item(session.id, item.id, "A".into(), 1, Some("d1")).await.unwrap();
        assert!(first.is_success(), "{backend}");

        // A second writer still holding version 1.
        let stale = store.update_item(session.id, item.id, "B".into(), 1, Some("d1")).await.unwrap();
        assert_eq!(
            serde_json::to_value(&stale).unwrap(),
            json!({ "success": false, "conflict": { "serverVersion": 2, "serverContent": "A" } }),
            "{backend}"
        );

        let version_after_conflict = store.get_session_by_id(session.id).await.unwrap().version;

        let retried = store.update_item(session.id, item.id, "B".into(), 2, Some("d1")).await.unwrap();
        let UpdateOutcome::Updated(resolved) = retried else {
            panic!("{backend}: retry with the server version should succeed");
        };
        assert_eq!(resolved.version, 3);
        assert_eq!(resolved.content, "B");

        let stored = store.get_session_by_id(session.id).await.unwrap();
        assert_eq!(stored.version, version_after_conflict + 1, "{backend}: conflicts do not bump");
    }
}

#[tokio::test]
async fn test_missing_item_update_is_not_success() {
    for (backend, store) in all_backends() {
        let session = store.create_session("d1").await.unwrap();
        let outcome = store
            .update_item(session.id, Uuid::now_v7(), "x".into(), 1, Some("d1"))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::NotFound, "{backend}");
        assert_eq!(serde_json::to_value(&outcome).unwrap(), json!({ "success": false }));
    }
}

#[tokio::test]
async fn test_ownership_is_enforced() {
    for (backend, store) in all_backends() {
        let session = store.create_session("d1").await.unwrap();
        let item = store.add_item(session.id, ItemType::Text, "mine".into(), "d1", "Mac").await.unwrap();

        let err = store
            .update_item(session.id, item.id, "theirs".into(), 1, Some("d2"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized(_)), "{backend}: {err:?}");

        assert!(!store.delete_item(session.id, item.id, "d2").await.unwrap(), "{backend}");
        let stored = store.get_session_by_id(session.id).await.unwrap();
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.items[0].content, "mine");

        assert!(store.delete_item(session.id, item.id, "d1").await.unwrap(), "{backend}");
        assert!(!store.delete_item(session.id, item.id, "d1").await.unwrap(), "{backend}: already gone");
        assert!(store.get_session_by_id(session.id).await.unwrap().items.is_empty());
    }
}

#[tokio::test]
async fn test_update_without_device_skips_ownership() {
    for (backend, store) in all_backends() {
        let session = store.create_session("d1").await.unwrap();
        let item = store.add_item(session.id, ItemType::Text, "mine".into(), "d1", "Mac").await.unwrap();

        let outcome = store.update_item(session.id, item.id, "edited".into(), 1, None).await.unwrap();
        assert!(outcome.is_success(), "{backend}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_single_winner() {
    for (backend, store) in all_backends() {
        let session = store.create_session("d1").await.unwrap();
        let item = store.add_item(session.id, ItemType::Text, "base".into(), "d1", "Mac").await.unwrap();

        let mut handles = Vec::new();
        for n in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_item(session.id, item.id, format!("writer-{n}"), 1, Some("d1"))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                UpdateOutcome::Updated(updated) => winners.push(updated),
                UpdateOutcome::Conflict(conflict) => assert_eq!(conflict.server_version, 2, "{backend}"),
                UpdateOutcome::NotFound => panic!("{backend}: item vanished"),
            }
        }

        assert_eq!(winners.len(), 1, "{backend}: exactly one writer wins");
        let stored = store.get_session_by_id(session.id).await.unwrap();
        assert_eq!(stored.items[0].version, 2);
        assert_eq!(stored.items[0].content, winners[0].content);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_are_all_kept() {
    const WRITERS: u64 = 10;

    for (backend, store) in all_backends() {
        let session = store.create_session("d1").await.unwrap();

        let mut handles = Vec::new();
        for n in 0..WRITERS {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .add_item(session.id, ItemType::Text, format!("item-{n}"), &format!("d{n}"), "Device")
                    .await
                    .unwrap()
            }));
        }
        let mut added = Vec::new();
        for handle in handles {
            added.push(handle.await.unwrap().id);
        }

        let stored = store.get_session_by_id(session.id).await.unwrap();
        assert_eq!(stored.items.len() as u64, WRITERS, "{backend}");
        for id in added {
            assert!(stored.find_item(id).is_some(), "{backend}: lost item {id}");
        }
        assert_eq!(stored.version, 1 + WRITERS, "{backend}");
    }
}
