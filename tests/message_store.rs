//! Message store behavior: ordering, soft-delete, cursor pagination and
//! cache freshness after writes.

mod common;

use chrono::Duration as ChronoDuration;
use common::{message_service, MemoryDb};
use fitpulse::service::messages::MessageKind;
use fitpulse::Error;

#[tokio::test]
async fn test_first_message_scenario() {
    let db = MemoryDb::leaked();
    db.add_user(1, "runner");
    let messages = message_service(db);

    messages
        .append(1, "room:1", "hello", Some(MessageKind::Text), None)
        .await
        .expect("append succeeds");

    let page = messages.history("room:1", Some(1), Some(50), None).await.unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.total, 1);
    assert!(!page.has_more);
    let only = &page.messages[0];
    assert_eq!(only.message.body, "hello");
    assert_eq!(only.message.kind, MessageKind::Text);
    assert!(!only.message.deleted);
    assert_eq!(only.sender_nickname, "runner");
}

#[tokio::test]
async fn test_pages_are_chronological_oldest_first() {
    let db = MemoryDb::leaked();
    db.add_user(1, "runner");
    let messages = message_service(db);

    for i in 0..25 {
        messages
            .append(1, "room:2", &format!("msg {i}"), None, None)
            .await
            .unwrap();
    }

    let first = messages.history("room:2", Some(1), Some(10), None).await.unwrap();
    assert_eq!(first.messages.len(), 10);
    assert!(first.has_more);
    // page 1 holds the latest window, oldest first within the page
    assert_eq!(first.messages[0].message.body, "msg 15");
    assert_eq!(first.messages[9].message.body, "msg 24");
    for pair in first.messages.windows(2) {
        assert!(pair[0].message.created_at <= pair[1].message.created_at);
    }

    let last = messages.history("room:2", Some(3), Some(10), None).await.unwrap();
    assert_eq!(last.messages.len(), 5);
    assert_eq!(last.messages[0].message.body, "msg 0");
    assert!(!last.has_more);
}

#[tokio::test]
async fn test_before_cursor_is_exclusive() {
    let db = MemoryDb::leaked();
    db.add_user(1, "runner");
    let messages = message_service(db);

    for i in 0..5 {
        messages
            .append(1, "room:3", &format!("msg {i}"), None, None)
            .await
            .unwrap();
    }
    let all = messages.history("room:3", Some(1), Some(50), None).await.unwrap();
    let cursor = all.messages[2].message.created_at;

    let older = messages
        .history("room:3", Some(1), Some(50), Some(cursor))
        .await
        .unwrap();
    assert_eq!(older.messages.len(), 2, "strictly older than the cursor");
    assert!(older
        .messages
        .iter()
        .all(|m| m.message.created_at < cursor));
}

#[tokio::test]
async fn test_soft_delete_is_non_destructive() {
    let db = MemoryDb::leaked();
    db.add_user(1, "runner");
    db.add_user(2, "lifter");
    let messages = message_service(db);

    let sent = messages
        .append(1, "room:4", "delete me", None, None)
        .await
        .unwrap();
    let id = sent.message.id;

    // a non-owner delete is a no-op
    assert!(messages.soft_delete(id, 2).await.unwrap().is_none());
    assert!(!messages.get(id).await.unwrap().unwrap().deleted);

    // the owner delete hides the message but keeps the row
    let deleted = messages.soft_delete(id, 1).await.unwrap().expect("owner");
    assert!(deleted.deleted);
    let page = messages.history("room:4", Some(1), Some(50), None).await.unwrap();
    assert!(page.messages.is_empty());
    let direct = messages.get(id).await.unwrap().expect("row survives");
    assert!(direct.deleted);

    // deleting again (even as the owner) changes nothing
    assert!(messages.soft_delete(id, 1).await.unwrap().is_none());
    assert!(messages.soft_delete(id, 2).await.unwrap().is_none());
}

#[tokio::test]
async fn test_deep_pages_reflect_writes_despite_caching() {
    let db = MemoryDb::leaked();
    db.add_user(1, "runner");
    let messages = message_service(db);

    for i in 0..120 {
        messages
            .append(1, "room:5", &format!("msg {i}"), None, None)
            .await
            .unwrap();
    }

    // warm the page-2 cache entry
    let warm = messages.history("room:5", Some(2), Some(50), None).await.unwrap();
    assert_eq!(warm.total, 120);

    messages
        .append(1, "room:5", "the newest one", None, None)
        .await
        .unwrap();

    // page 2 is normally cache-served, but the append swept the container
    let fresh = messages.history("room:5", Some(2), Some(50), None).await.unwrap();
    assert_eq!(fresh.total, 121, "cache was invalidated by the append");

    let deleted = messages.history("room:5", Some(1), Some(50), None).await.unwrap();
    let victim = deleted.messages.last().unwrap().message.id;
    messages.soft_delete(victim, 1).await.unwrap().expect("owner delete");
    let after_delete = messages.history("room:5", Some(2), Some(50), None).await.unwrap();
    assert_eq!(after_delete.total, 120, "delete also sweeps the cache");
}

#[tokio::test]
async fn test_validation_rejects_before_persisting() {
    let db = MemoryDb::leaked();
    let messages = message_service(db);

    let err = messages
        .append(1, "room:6", "", Some(MessageKind::Text), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let oversized = "x".repeat(1001);
    let err = messages.append(1, "room:6", &oversized, None, None).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let page = messages.history("room:6", Some(1), Some(50), None).await.unwrap();
    assert_eq!(page.total, 0, "nothing was persisted");
}

#[tokio::test]
async fn test_export_range_is_inclusive_and_ordered() {
    let db = MemoryDb::leaked();
    db.add_user(1, "runner");
    let messages = message_service(db);

    for i in 0..10 {
        messages
            .append(1, "room:7", &format!("msg {i}"), None, None)
            .await
            .unwrap();
    }
    let page = messages.history("room:7", Some(1), Some(50), None).await.unwrap();
    let from = page.messages[2].message.created_at;
    let to = page.messages[6].message.created_at;

    let exported = messages.export_range("room:7", from, to).await.unwrap();
    assert_eq!(exported.len(), 5, "bounds are inclusive");
    for pair in exported.windows(2) {
        assert!(pair[0].created_at <= pair[1].created_at);
    }

    let empty = messages
        .export_range("room:7", to + ChronoDuration::days(1), to + ChronoDuration::days(2))
        .await
        .unwrap();
    assert!(empty.is_empty());
}
