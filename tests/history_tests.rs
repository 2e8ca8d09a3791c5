//! Conversation log behavior: append-only ordering, exchange pairing
//! and the explicit clear.

use stonechat::history::{ConversationLog, Role};

#[test]
fn test_empty_log() {
    let log = ConversationLog::new();
    assert!(log.is_empty());
    assert_eq!(log.len(), 0);
    assert!(log.exchanges().is_empty());
}

#[test]
fn test_messages_keep_insertion_order() {
    let mut log = ConversationLog::new();
    log.push_user("first");
    log.push_assistant("second");
    log.push_user("third");

    let messages = log.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].content, "first");
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].content, "second");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[2].content, "third");
}

#[test]
fn test_exchanges_pair_user_with_assistant() {
    let mut log = ConversationLog::new();
    log.push_user("q1");
    log.push_assistant("a1");
    log.push_user("q2");
    log.push_assistant("a2");

    let exchanges = log.exchanges();
    assert_eq!(exchanges.len(), 2);
    assert_eq!(exchanges[0].user, "q1");
    assert_eq!(exchanges[0].assistant, "a1");
    assert_eq!(exchanges[1].user, "q2");
    assert_eq!(exchanges[1].assistant, "a2");
}

#[test]
fn test_pending_exchange_has_empty_assistant() {
    let mut log = ConversationLog::new();
    log.push_user("waiting");

    let exchanges = log.exchanges();
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0].user, "waiting");
    assert_eq!(exchanges[0].assistant, "");
}

#[test]
fn test_orphan_assistant_message_keeps_its_own_exchange() {
    let mut log = ConversationLog::new();
    log.push_assistant("unprompted");

    let exchanges = log.exchanges();
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0].user, "");
    assert_eq!(exchanges[0].assistant, "unprompted");
}

#[test]
fn test_clear_empties_everything() {
    let mut log = ConversationLog::new();
    log.push_user("hello");
    log.push_assistant("hi");
    log.clear();

    assert!(log.is_empty());
    assert!(log.exchanges().is_empty());
}

#[test]
fn test_log_survives_clear_and_reuse() {
    let mut log = ConversationLog::new();
    log.push_user("before");
    log.clear();
    log.push_user("after");
    log.push_assistant("reply");

    let exchanges = log.exchanges();
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0].user, "after");
}

#[test]
fn test_messages_serialize_with_lowercase_roles() {
    let mut log = ConversationLog::new();
    log.push_user("hi");

    let json = serde_json::to_string(log.messages()).unwrap();
    assert!(json.contains(r#""role":"user""#));
    assert!(json.contains(r#""content":"hi""#));
}
