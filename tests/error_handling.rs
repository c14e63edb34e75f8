//! Error handling and edge case tests.

use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use todo_sync::{
    validate_json, ChangeEvent, CreateTodoInput, ErrorKind, FileStorage, KeyValueStorage,
    MemoryGateway, MemoryStorage, Operation, Priority, StoreConfig, StoreError, TodoId,
    TodoPatch, TodoStore, UpdateTodoInput, Validate,
};

fn offline_store() -> (Arc<MemoryStorage>, TodoStore) {
    let storage = Arc::new(MemoryStorage::new());
    let store = TodoStore::offline(storage.clone(), StoreConfig::default());
    (storage, store)
}

// --- Validation ---

#[tokio::test]
async fn test_blank_text_rejected_without_backend_call() {
    let (storage, store) = offline_store();

    assert!(!store.add_text("   ", Priority::Medium).await);

    assert!(store.todos().is_empty());
    assert!(storage.is_empty());
    let error = store.last_error().unwrap();
    assert_eq!(error.kind, ErrorKind::Validation);
    assert_eq!(error.operation, Operation::Add);
    assert!(error.message.contains("text: Text is required"));
}

#[tokio::test]
async fn test_blank_text_rejected_in_live_mode() {
    let gateway = MemoryGateway::new();
    let store = TodoStore::live(Arc::new(gateway.clone()), "users/u/todos", StoreConfig::default());

    assert!(!store.add_text("", Priority::Medium).await);
    assert!(gateway.documents("users/u/todos").is_empty());
    assert_eq!(store.last_error().unwrap().kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_empty_patch_rejected() {
    let (_storage, store) = offline_store();
    store.add_text("Something", Priority::Medium).await;
    let id = store.todos()[0].id.clone();

    assert!(!store.update(&id, TodoPatch::default()).await);
    assert_eq!(store.last_error().unwrap().kind, ErrorKind::Validation);

    assert!(!store.set_text(&id, "   ").await);
    assert_eq!(store.todos()[0].text, "Something");
}

#[test]
fn test_validation_reports_first_message_per_path() {
    let input = UpdateTodoInput {
        text: Some("  ".into()),
        completed: None,
        priority: Some("urgent".into()),
    };
    let errors = input.validate().unwrap_err();
    assert_eq!(errors.get("text"), Some("Text is required"));
    assert_eq!(
        errors.get("priority"),
        Some("Priority must be one of low, medium, high")
    );
}

#[test]
fn test_title_alias_accepted() {
    let todo = validate_json::<CreateTodoInput>(&serde_json::json!({"title": "Legacy"})).unwrap();
    assert_eq!(todo.text(), "Legacy");
}

// --- Not found ---

#[tokio::test]
async fn test_unknown_id_leaves_collection_unchanged() {
    let (_storage, store) = offline_store();
    store.add_text("Real", Priority::Medium).await;
    let before = store.todos();
    let missing = TodoId::from("missing");

    assert!(!store.update(&missing, TodoPatch::completed(true)).await);
    assert_eq!(store.last_error().unwrap().kind, ErrorKind::NotFound);

    assert!(!store.toggle_completed(&missing).await);
    assert!(!store.remove(&missing).await);
    assert_eq!(store.last_error().unwrap().operation, Operation::Remove);

    assert_eq!(store.todos(), before);
}

#[tokio::test]
async fn test_unknown_id_reported_before_invalid_patch() {
    let (_storage, store) = offline_store();
    let missing = TodoId::from("missing");

    assert!(!store.set_text(&missing, "   ").await);
    assert_eq!(store.last_error().unwrap().kind, ErrorKind::NotFound);

    assert!(!store.update(&missing, TodoPatch::default()).await);
    assert_eq!(store.last_error().unwrap().kind, ErrorKind::NotFound);

    let gateway = MemoryGateway::new();
    let live = TodoStore::live(Arc::new(gateway.clone()), "users/u/todos", StoreConfig::default());
    live.subscribe();
    assert!(!live.set_text(&missing, "").await);
    assert_eq!(live.last_error().unwrap().kind, ErrorKind::NotFound);
    assert!(gateway.documents("users/u/todos").is_empty());
}

// --- Storage failures ---

#[tokio::test]
async fn test_failed_persist_does_not_commit() {
    let (storage, store) = offline_store();
    assert!(store.add_text("Fits", Priority::Medium).await);
    let before = store.todos();

    storage.set_quota(Some(storage.used_bytes()));
    assert!(!store.add_text("Does not fit", Priority::Medium).await);
    assert_eq!(store.todos(), before);
    assert_eq!(store.last_error().unwrap().kind, ErrorKind::OperationFailed);

    // Removing shrinks the payload, so it still persists.
    let id = before[0].id.clone();
    assert!(store.remove(&id).await);
    assert!(store.todos().is_empty());
}

#[tokio::test]
async fn test_corrupt_payload_keeps_previous_collection() {
    let (storage, store) = offline_store();
    store.add_text("Survivor", Priority::Medium).await;

    storage.set("todos", b"{not json").unwrap();
    assert!(!store.load().await);

    assert_eq!(store.todos()[0].text, "Survivor");
    let error = store.last_error().unwrap();
    assert_eq!(error.operation, Operation::Load);
    assert_eq!(error.kind, ErrorKind::OperationFailed);
}

#[test]
fn test_file_storage_locked() {
    let dir = TempDir::new().unwrap();
    let _first = FileStorage::open(dir.path()).unwrap();

    let second = FileStorage::open(dir.path());
    assert!(matches!(second, Err(StoreError::Locked)));
    assert_eq!(StoreError::Locked.kind(), ErrorKind::BackendUnavailable);
}

#[tokio::test]
async fn test_file_corruption_surfaces_on_load() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
    let store = TodoStore::offline(storage, StoreConfig::default());
    store.add_text("Fragile", Priority::Medium).await;

    let value_file = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().map(|e| e == "kv").unwrap_or(false))
        .unwrap();
    let mut bytes = fs::read(&value_file).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0xFF;
    fs::write(&value_file, bytes).unwrap();

    assert!(!store.load().await);
    assert_eq!(store.todos()[0].text, "Fragile");
    assert_eq!(store.last_error().unwrap().kind, ErrorKind::OperationFailed);
}

#[tokio::test]
async fn test_corrupt_length_field_surfaces_on_load() {
    let dir = TempDir::new().unwrap();
    {
        let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
        let store = TodoStore::offline(storage, StoreConfig::default());
        assert!(store.add_text("Fragile", Priority::Medium).await);
        store.dispose();
    }

    let value_file = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().map(|e| e == "kv").unwrap_or(false))
        .unwrap();
    let mut bytes = fs::read(&value_file).unwrap();
    bytes[12] = 0x7f;
    fs::write(&value_file, bytes).unwrap();

    let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
    let store = TodoStore::offline(storage, StoreConfig::default());
    assert!(!store.load().await);

    assert!(store.todos().is_empty());
    let error = store.last_error().unwrap();
    assert_eq!(error.operation, Operation::Load);
    assert_eq!(error.kind, ErrorKind::OperationFailed);
}

// --- Error lifecycle ---

#[tokio::test]
async fn test_clear_error_emits_change() {
    let (_storage, store) = offline_store();
    store.add_text("", Priority::Medium).await;
    let changes = store.watch_all();

    store.clear_error();
    store.clear_error();

    assert!(store.last_error().is_none());
    assert_eq!(
        changes.drain(),
        vec![ChangeEvent::ErrorChanged {
            kind: None,
            message: None
        }]
    );
}

#[tokio::test]
async fn test_newer_error_replaces_older() {
    let (_storage, store) = offline_store();
    store.add_text("", Priority::Medium).await;
    store.remove(&TodoId::from("nope")).await;

    let error = store.last_error().unwrap();
    assert_eq!(error.operation, Operation::Remove);
    assert_eq!(error.kind, ErrorKind::NotFound);
}

#[test]
fn test_status_codes() {
    assert_eq!(StoreError::NotFound(TodoId::from("x")).status_code(), 404);
    assert_eq!(StoreError::BackendUnavailable("down".into()).status_code(), 503);
    assert_eq!(StoreError::OperationFailed("no".into()).status_code(), 500);
    assert_eq!(
        StoreError::Deserialization("bad".into()).kind(),
        ErrorKind::OperationFailed
    );
}
