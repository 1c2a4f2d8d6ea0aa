//! Integration tests for change classification
//!
//! Mutations are classified one at a time against a store that counts
//! reads, so it is visible when a classification touches the store.

mod common;

use std::sync::Arc;

use common::{engine_on, key, memory_store, put_json, seed_backend, seed_frontend, FlakyStore};
use routeplane::domain::{
    BackendKey, ChangeEvent, FrontendKey, HostKey, ListenerKey, Middleware, MiddlewareKey,
    ServerKey,
};
use routeplane::store::{Mutation, MutationKind};
use routeplane::Error;
use serde_json::json;

fn mutation(kind: MutationKind, path: &str) -> Mutation {
    Mutation { kind, key: key(path), revision: 1, prev_value: None }
}

#[tokio::test]
async fn test_host_put_then_delete() {
    let inner = memory_store();
    put_json(&inner, "hosts/h1/host", json!({"settings": {"default": true}})).await;
    let flaky = Arc::new(FlakyStore::new(inner));
    let engine = engine_on(flaky.clone());

    let event = engine.classify(&mutation(MutationKind::Put, "hosts/h1/host")).await.unwrap();
    match event {
        Some(ChangeEvent::HostUpserted { host }) => {
            assert_eq!(host.name, "h1");
            assert!(host.settings.default);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(flaky.point_reads(), 1);

    let event = engine.classify(&mutation(MutationKind::Delete, "hosts/h1/host")).await.unwrap();
    assert_eq!(event, Some(ChangeEvent::HostDeleted { key: HostKey::new("h1") }));
    assert_eq!(flaky.point_reads(), 1, "a delete must not read the store");
}

#[tokio::test]
async fn test_middleware_put_identifies_frontend_and_middleware() {
    let store = memory_store();
    let engine = engine_on(store.clone());
    seed_backend(&engine, "b1", &["http://10.0.0.1:80"]).await;
    seed_frontend(&engine, "f1", "b1").await;
    let middleware = Middleware::new("m1", "ratelimit", json!({"requests": 100}));
    engine.upsert_middleware(&FrontendKey::new("f1"), &middleware, None).await.unwrap();

    let event = engine
        .classify(&mutation(MutationKind::Put, "frontends/f1/middlewares/m1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.parent_id(), Some("f1"));
    assert_eq!(event.entity_id(), "m1");

    let frontend = engine.frontend_spec(&FrontendKey::new("f1")).await.unwrap();
    assert!(frontend.middleware("m1").is_some());
}

#[tokio::test]
async fn test_container_puts_reassemble_children() {
    let store = memory_store();
    let engine = engine_on(store.clone());
    seed_backend(&engine, "b1", &["http://10.0.0.1:80", "http://10.0.0.2:80"]).await;

    let event =
        engine.classify(&mutation(MutationKind::Put, "backends/b1/backend")).await.unwrap();
    match event {
        Some(ChangeEvent::BackendUpserted { backend }) => {
            assert_eq!(backend.backend.id, "b1");
            let ids: Vec<&str> = backend.servers.iter().map(|s| s.id.as_str()).collect();
            assert_eq!(ids, vec!["s1", "s2"]);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_every_family_classifies_deletes() {
    let engine = engine_on(memory_store());
    let cases = [
        ("hosts/h1/host", ChangeEvent::HostDeleted { key: HostKey::new("h1") }),
        ("listeners/l1", ChangeEvent::ListenerDeleted { key: ListenerKey::new("l1") }),
        ("frontends/f1/frontend", ChangeEvent::FrontendDeleted { key: FrontendKey::new("f1") }),
        (
            "frontends/f1/middlewares/m1",
            ChangeEvent::MiddlewareDeleted { key: MiddlewareKey::new("f1", "m1") },
        ),
        ("backends/b1/backend", ChangeEvent::BackendDeleted { key: BackendKey::new("b1") }),
        ("backends/b1/servers/s1", ChangeEvent::ServerDeleted { key: ServerKey::new("b1", "s1") }),
        // bare entity keys left by older writers
        ("frontends/f1", ChangeEvent::FrontendDeleted { key: FrontendKey::new("f1") }),
        ("backends/b1", ChangeEvent::BackendDeleted { key: BackendKey::new("b1") }),
    ];
    for (path, expected) in cases {
        let event = engine.classify(&mutation(MutationKind::Delete, path)).await.unwrap();
        assert_eq!(event, Some(expected), "classifying {}", path);
    }
}

#[tokio::test]
async fn test_server_key_is_not_taken_for_backend() {
    // a server whose id is literally "backend" must still be a server
    let engine = engine_on(memory_store());
    let event = engine
        .classify(&mutation(MutationKind::Delete, "backends/b1/servers/backend"))
        .await
        .unwrap();
    assert_eq!(event, Some(ChangeEvent::ServerDeleted { key: ServerKey::new("b1", "backend") }));
}

#[tokio::test]
async fn test_unmatched_keys_are_not_events() {
    let engine = engine_on(memory_store());
    for path in ["settings/version", "hosts/h1/host/extra", "backends/b1/servers", "frontends"] {
        let event = engine.classify(&mutation(MutationKind::Put, path)).await.unwrap();
        assert_eq!(event, None, "classifying {}", path);
    }
}

#[tokio::test]
async fn test_vanished_entity_propagates_not_found() {
    let engine = engine_on(memory_store());
    let error = engine
        .classify(&mutation(MutationKind::Put, "backends/b1/servers/s1"))
        .await
        .unwrap_err();
    assert!(matches!(error, Error::NotFound { ref id, .. } if id == "s1"));
}

#[tokio::test]
async fn test_malformed_put_is_an_error() {
    let store = memory_store();
    put_json(&store, "listeners/l1", json!({"protocol": "gopher"})).await;
    let engine = engine_on(store);

    let error = engine.classify(&mutation(MutationKind::Put, "listeners/l1")).await.unwrap_err();
    assert!(error.is_malformed());
}

#[tokio::test]
async fn test_expire_by_family() {
    let engine = engine_on(memory_store());

    let event =
        engine.classify(&mutation(MutationKind::Expire, "backends/b1/servers/s1")).await.unwrap();
    assert_eq!(event, Some(ChangeEvent::ServerDeleted { key: ServerKey::new("b1", "s1") }));

    let event = engine
        .classify(&mutation(MutationKind::Expire, "frontends/f1/middlewares/m1"))
        .await
        .unwrap();
    assert_eq!(event, Some(ChangeEvent::MiddlewareDeleted { key: MiddlewareKey::new("f1", "m1") }));

    for path in ["hosts/h1/host", "listeners/l1", "backends/b1/backend"] {
        let error = engine.classify(&mutation(MutationKind::Expire, path)).await.unwrap_err();
        assert!(matches!(error, Error::UnsupportedAction { .. }), "expiring {}", path);
    }
}
