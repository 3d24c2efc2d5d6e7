//! Conversation invariants: pair uniqueness, list hiding and resurfacing.

mod common;

use common::{direct_service, MemoryDb};
use fitpulse::Error;

#[tokio::test]
async fn test_conversation_is_unique_per_unordered_pair() {
    let db = MemoryDb::leaked();
    let direct = direct_service(db);

    let ab = direct.open_conversation(4, 9).await.unwrap();
    let ba = direct.open_conversation(9, 4).await.unwrap();
    assert_eq!(ab.id, ba.id, "argument order never forks the conversation");
    assert_eq!((ab.user_low, ab.user_high), (4, 9));

    let other = direct.open_conversation(4, 10).await.unwrap();
    assert_ne!(ab.id, other.id);
}

#[tokio::test]
async fn test_self_conversation_is_rejected() {
    let db = MemoryDb::leaked();
    let direct = direct_service(db);
    assert!(matches!(
        direct.open_conversation(7, 7).await.unwrap_err(),
        Error::Validation(_)
    ));
}

#[tokio::test]
async fn test_delete_for_me_hides_only_my_list() {
    let db = MemoryDb::leaked();
    let direct = direct_service(db);

    let conversation = direct.open_conversation(1, 2).await.unwrap();
    direct.delete_for(conversation.id, 1).await.unwrap();

    assert!(direct.list_for_user(1).await.unwrap().is_empty());
    let peers = direct.list_for_user(2).await.unwrap();
    assert_eq!(peers.len(), 1, "the row survives for the other party");
}

#[tokio::test]
async fn test_new_message_resurfaces_hidden_conversation() {
    let db = MemoryDb::leaked();
    let direct = direct_service(db);

    let conversation = direct.open_conversation(1, 2).await.unwrap();
    direct.delete_for(conversation.id, 2).await.unwrap();
    assert!(direct.list_for_user(2).await.unwrap().is_empty());

    // user 1 sends; the receiver's hidden flag is cleared by the touch
    direct
        .touch(conversation.id, "you up?", chrono::Utc::now(), 2)
        .await
        .unwrap();

    let lists = direct.list_for_user(2).await.unwrap();
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].last_message.as_deref(), Some("you up?"));
}

#[tokio::test]
async fn test_party_check_guards_foreign_conversations() {
    let db = MemoryDb::leaked();
    let direct = direct_service(db);

    let conversation = direct.open_conversation(1, 2).await.unwrap();
    assert!(direct.require_party(conversation.id, 1).await.is_ok());
    assert!(matches!(
        direct.require_party(conversation.id, 3).await.unwrap_err(),
        Error::Authorization(_)
    ));
    assert!(matches!(
        direct.require_party(uuid::Uuid::new_v4(), 1).await.unwrap_err(),
        Error::NotFound(_)
    ));
}
