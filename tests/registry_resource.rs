//! Scoped store registry and server resource tests.

use serde_json::json;
use std::sync::Arc;
use todo_sync::{
    CreateTodoInput, Identity, MemoryGateway, Priority, StoreConfig, StoreRegistry, TodoId,
    TodoResource, TodoStore, UpdateTodoInput,
};

fn resource(gateway: &MemoryGateway) -> TodoResource {
    TodoResource::for_identity(
        Arc::new(gateway.clone()),
        &Identity::new("alice"),
        &StoreConfig::default(),
    )
}

// --- Registry ---

#[tokio::test]
async fn test_registry_scopes_are_isolated() {
    let gateway = MemoryGateway::new();
    let registry = StoreRegistry::new();
    let open = |uid: &str| {
        let gateway: Arc<MemoryGateway> = Arc::new(gateway.clone());
        let identity = Identity::new(uid);
        move || TodoStore::live_for(gateway, &identity, StoreConfig::default())
    };

    let alice = registry.get_or_insert_with("alice", open("alice"));
    let bob = registry.get_or_insert_with("bob", open("bob"));
    alice.subscribe();
    bob.subscribe();

    assert!(alice.add_text("Alice's todo", Priority::Medium).await);
    assert_eq!(alice.total_count(), 1);
    assert_eq!(bob.total_count(), 0);

    let again = registry.get_or_insert_with("alice", open("alice"));
    assert_eq!(again.total_count(), 1);
    assert_eq!(gateway.subscriptions_opened(), 2);
}

#[tokio::test]
async fn test_registry_remove_closes_subscription() {
    let gateway = MemoryGateway::new();
    let registry = StoreRegistry::new();
    let store = registry.get_or_insert_with("alice", || {
        TodoStore::live_for(
            Arc::new(gateway.clone()),
            &Identity::new("alice"),
            StoreConfig::default(),
        )
    });
    store.subscribe();
    assert_eq!(gateway.active_subscriptions(), 1);

    assert!(registry.remove("alice"));
    assert_eq!(gateway.active_subscriptions(), 0);
    assert!(store.is_disposed());
}

#[tokio::test]
async fn test_dropping_registry_disposes_stores() {
    let gateway = MemoryGateway::new();
    let store = {
        let registry = StoreRegistry::new();
        let store = registry.get_or_insert_with("alice", || {
            TodoStore::live(Arc::new(gateway.clone()), "users/alice/todos", StoreConfig::default())
        });
        store.subscribe();
        store
    };

    assert!(store.is_disposed());
    assert_eq!(gateway.active_subscriptions(), 0);
}

// --- Resource ---

#[tokio::test]
async fn test_resource_crud() {
    let gateway = MemoryGateway::new();
    let resource = resource(&gateway);
    assert_eq!(resource.collection(), "users/alice/todos");

    let id = resource
        .create(&CreateTodoInput::new(" Buy milk ").with_priority(Priority::High))
        .await
        .unwrap();

    let todo = resource.get(&id).await.unwrap();
    assert_eq!(todo.text, "Buy milk");
    assert_eq!(todo.priority, Priority::High);

    let update = UpdateTodoInput {
        completed: Some(true),
        ..Default::default()
    };
    resource.update(&id, &update).await.unwrap();
    assert!(resource.get(&id).await.unwrap().completed);

    resource.remove(&id).await.unwrap();
    assert!(resource.list().await.unwrap().is_empty());
    assert_eq!(resource.get(&id).await.unwrap_err().status_code(), 404);
}

#[tokio::test]
async fn test_resource_and_store_share_document_shape() {
    let gateway = MemoryGateway::new();
    let resource = resource(&gateway);
    let store = TodoStore::live_for(
        Arc::new(gateway.clone()),
        &Identity::new("alice"),
        StoreConfig::default(),
    );
    store.subscribe();

    let id = resource
        .create(&CreateTodoInput::new("Created on the server"))
        .await
        .unwrap();

    let todo = store.get(&id).unwrap();
    assert_eq!(todo.text, "Created on the server");
    assert_eq!(todo.priority, Priority::Medium);
    assert!(!todo.completed);
}

#[tokio::test]
async fn test_handle_list() {
    let gateway = MemoryGateway::new();
    let resource = resource(&gateway);
    resource
        .create(&CreateTodoInput::new("Listed"))
        .await
        .unwrap();

    let response = resource.handle_list().await;
    assert_eq!(response.status, 200);
    assert!(response.ok);
    assert_eq!(response.data.unwrap()[0].text, "Listed");
}

#[tokio::test]
async fn test_handle_create_success() {
    let gateway = MemoryGateway::new();
    let resource = resource(&gateway);

    let response = resource.handle_create(&json!({"title": "From a form"})).await;

    assert_eq!(response.status, 201);
    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["ok"], json!(true));
    let id = TodoId::from(body["data"]["id"].as_str().unwrap());
    assert_eq!(resource.get(&id).await.unwrap().text, "From a form");
}

#[tokio::test]
async fn test_handle_create_invalid_payload() {
    let gateway = MemoryGateway::new();
    let resource = resource(&gateway);

    let response = resource.handle_create(&json!({"text": "  "})).await;
    assert_eq!(response.status, 400);
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({
            "ok": false,
            "error": "Invalid payload",
            "issues": [{"path": "text", "message": "Text is required"}]
        })
    );

    let response = resource.handle_create(&json!(null)).await;
    assert_eq!(response.status, 400);
    assert_eq!(response.issues.unwrap()[0].path, "_form");
    assert!(gateway.documents(resource.collection()).is_empty());
}

#[tokio::test]
async fn test_handle_list_backend_down() {
    let gateway = MemoryGateway::new();
    let resource = resource(&gateway);
    gateway.set_available(false);

    let response = resource.handle_list().await;
    assert_eq!(response.status, 503);
    assert!(!response.ok);
    assert!(response.data.is_none());
}
