//! Persistence contract tests against the in-memory store.

use backend::store::{MAX_TOKENS_PER_USER, MemStore, Storage, Store};
use backend::StoreError;

fn store() -> Store {
    Store::Memory(MemStore::new(["gcm"]))
}

#[tokio::test]
async fn user_lifecycle() {
    let store = store();

    assert!(!store.user_exists(42).await.unwrap());
    store.user_add(42).await.unwrap();
    assert!(store.user_exists(42).await.unwrap());
    assert_eq!(store.users().await.unwrap(), vec![42]);

    store.user_del(42).await.unwrap();
    assert!(!store.user_exists(42).await.unwrap());
}

#[tokio::test]
async fn duplicate_user_is_rejected() {
    let store = store();
    store.user_add(1).await.unwrap();
    assert_eq!(
        store.user_add(1).await.unwrap_err(),
        StoreError::DuplicateUser(1)
    );
}

#[tokio::test]
async fn deleting_absent_user_is_rejected() {
    let store = store();
    assert_eq!(
        store.user_del(9).await.unwrap_err(),
        StoreError::UnknownUser(9)
    );
}

#[tokio::test]
async fn token_requires_existing_user() {
    let store = store();
    assert_eq!(
        store.token_add("gcm", 5, "TOKEN").await.unwrap_err(),
        StoreError::UnknownUser(5)
    );
}

#[tokio::test]
async fn cascade_removes_tokens_on_user_delete() {
    let store = store();
    store.user_add(7).await.unwrap();
    store.token_add("gcm", 7, "TOKEN-A").await.unwrap();
    store.token_add("gcm", 7, "TOKEN-B").await.unwrap();

    store.user_del(7).await.unwrap();

    assert!(store.tokens_for_user("gcm", 7).await.unwrap().is_empty());
    assert!(!store.token_exists("gcm", "TOKEN-A").await.unwrap());
    assert!(!store.token_exists("gcm", "TOKEN-B").await.unwrap());
}

#[tokio::test]
async fn capacity_cap_holds() {
    let store = store();
    store.user_add(9).await.unwrap();

    for i in 0..MAX_TOKENS_PER_USER {
        store.token_add("gcm", 9, &format!("T{i}")).await.unwrap();
    }

    assert_eq!(
        store.token_add("gcm", 9, "T10").await.unwrap_err(),
        StoreError::TokenCapacity(9)
    );

    // The earlier tokens are intact and the overflow token was not stored.
    let tokens = store.tokens_for_user("gcm", 9).await.unwrap();
    assert_eq!(tokens.len(), MAX_TOKENS_PER_USER);
    assert!(!tokens.iter().any(|t| t == "T10"));
}

#[tokio::test]
async fn cap_is_per_user() {
    let store = store();
    store.user_add(1).await.unwrap();
    store.user_add(2).await.unwrap();

    for i in 0..MAX_TOKENS_PER_USER {
        store.token_add("gcm", 1, &format!("A{i}")).await.unwrap();
    }
    // A different user is unaffected by the first user's full slot set.
    store.token_add("gcm", 2, "B0").await.unwrap();
}

#[tokio::test]
async fn duplicate_token_is_rejected() {
    let store = store();
    store.user_add(1).await.unwrap();
    store.token_add("gcm", 1, "TOKEN").await.unwrap();
    assert!(matches!(
        store.token_add("gcm", 1, "TOKEN").await.unwrap_err(),
        StoreError::DuplicateToken(_)
    ));
}

#[tokio::test]
async fn token_delete_is_silent_when_absent() {
    let store = store();
    store.token_del("gcm", "NEVER-SEEN").await.unwrap();
}

#[tokio::test]
async fn token_rename_preserves_owner() {
    let store = store();
    store.user_add(3).await.unwrap();
    store.token_add("gcm", 3, "OLD").await.unwrap();

    store.token_update("gcm", "OLD", "NEW").await.unwrap();

    let tokens = store.tokens_for_user("gcm", 3).await.unwrap();
    assert_eq!(tokens, vec!["NEW"]);
    assert!(!store.token_exists("gcm", "OLD").await.unwrap());
}

#[tokio::test]
async fn token_rename_of_absent_token_is_silent() {
    let store = store();
    store.token_update("gcm", "MISSING", "NEW").await.unwrap();
}

#[tokio::test]
#[should_panic(expected = "more than one user")]
async fn token_rename_over_two_rows_is_fatal() {
    let store = store();
    store.user_add(1).await.unwrap();
    store.user_add(2).await.unwrap();
    // Two users sharing one token is already a broken state; a rename must
    // refuse to touch it.
    store.token_add("gcm", 1, "SHARED").await.unwrap();
    store.token_add("gcm", 2, "SHARED").await.unwrap();

    let _ = store.token_update("gcm", "SHARED", "NEW").await;
}

#[tokio::test]
async fn subscription_queries() {
    let store = store();
    store.user_add(7).await.unwrap();

    assert!(!store.user_subscribed("gcm", 7).await.unwrap());
    store.token_add("gcm", 7, "TOKEN-A").await.unwrap();

    assert!(store.user_subscribed("gcm", 7).await.unwrap());
    assert!(store.subscription_exists("gcm", 7, "TOKEN-A").await.unwrap());
    assert!(!store.subscription_exists("gcm", 7, "TOKEN-B").await.unwrap());
    assert!(store.token_exists("gcm", "TOKEN-A").await.unwrap());
}

#[tokio::test]
async fn gateway_names_are_case_insensitive() {
    let store = store();
    store.user_add(1).await.unwrap();
    store.token_add("GCM", 1, "TOKEN").await.unwrap();
    assert!(store.token_exists("gcm", "TOKEN").await.unwrap());
}

#[tokio::test]
async fn unknown_gateway_is_rejected() {
    let store = store();
    store.user_add(1).await.unwrap();
    assert!(matches!(
        store.token_add("apns", 1, "TOKEN").await.unwrap_err(),
        StoreError::UnknownGateway(_)
    ));
}

#[tokio::test]
async fn queries_do_not_mutate() {
    let store = store();
    store.user_add(7).await.unwrap();
    store.token_add("gcm", 7, "TOKEN-A").await.unwrap();

    for _ in 0..3 {
        assert!(store.user_exists(7).await.unwrap());
        assert!(store.user_subscribed("gcm", 7).await.unwrap());
        assert_eq!(
            store.tokens_for_user("gcm", 7).await.unwrap(),
            vec!["TOKEN-A"]
        );
    }
}
