//! Push fan-out accounting tests.

use backend::store::{MemStore, Storage, Store};
use backend::{Gateway, Gcm, GcmConfig, PushError, Registry, push_all};
use protocol::Message;

fn gcm_registry(store: &Store, endpoint: &str) -> Registry {
    let gcm = Gcm::new(&GcmConfig::new("secret"), store.clone())
        .unwrap()
        .with_endpoint(endpoint);
    let mut registry = Registry::new();
    registry.register(Gcm::NAME, Gateway::Gcm(gcm));
    registry
}

#[tokio::test]
async fn empty_registry_reports_no_failures() {
    let registry = Registry::new();
    let (failed, failures) = push_all(&registry, 7, &Message::new()).await;
    assert!(!failed);
    assert!(failures.is_empty());
}

#[tokio::test]
async fn unsubscribed_gateway_is_not_a_failure() {
    let store = Store::Memory(MemStore::new(["gcm"]));
    store.user_add(7).await.unwrap();
    // Endpoint never contacted: the user has no tokens.
    let registry = gcm_registry(&store, "http://127.0.0.1:9/");

    let (failed, failures) = push_all(&registry, 7, &Message::new()).await;
    assert!(!failed);
    assert!(failures.is_empty());
}

#[tokio::test]
async fn gateway_failure_is_reported_by_name() {
    let store = Store::Memory(MemStore::new(["gcm"]));
    store.user_add(7).await.unwrap();
    store.token_add("gcm", 7, "TOKEN").await.unwrap();

    // An unreachable endpoint turns the delivery into a transport error.
    let unreachable = {
        let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);
        format!("http://{addr}/")
    };
    let registry = gcm_registry(&store, &unreachable);

    let (failed, failures) = push_all(&registry, 7, &Message::new()).await;
    assert!(failed);
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures.get("gcm"), Some(PushError::Http(_))));
}

#[tokio::test]
async fn registry_lookup_is_case_insensitive() {
    let store = Store::Memory(MemStore::new(["gcm"]));
    let registry = gcm_registry(&store, "http://127.0.0.1:9/");

    assert!(registry.contains("gcm"));
    assert!(registry.contains("GCM"));
    assert!(registry.get("Gcm").is_some());
    assert!(registry.get("apns").is_none());
}
