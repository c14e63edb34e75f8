//! Mapping between gateway documents and todos.
//!
//! Both the store and the server resource write through these functions so
//! the two paths always produce the same document shape.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tracing::warn;

use super::{Document, Fields};
use crate::error::{Result, StoreError};
use crate::types::{NewTodo, Priority, Todo, TodoId, TodoPatch};

/// Decode a todo from a document.
///
/// `text` falls back to `title`; `completed` defaults to false; an unknown
/// or missing `priority` reads as medium; a missing `createdAt` (a server
/// timestamp not yet resolved) reads as the Unix epoch.
pub fn todo_from_document(doc: &Document) -> Result<Todo> {
    let text = doc
        .get("text")
        .or_else(|| doc.get("title"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            StoreError::Deserialization(format!("document {} has no text", doc.id))
        })?;

    let completed = doc.get("completed").and_then(Value::as_bool).unwrap_or(false);

    let priority = doc
        .get("priority")
        .and_then(Value::as_str)
        .and_then(|p| p.parse::<Priority>().ok())
        .unwrap_or_default();

    let created_at = match doc.get("createdAt") {
        None | Some(Value::Null) => DateTime::<Utc>::default(),
        Some(value) => parse_timestamp(value).ok_or_else(|| {
            StoreError::Deserialization(format!(
                "document {} has an unreadable createdAt: {}",
                doc.id, value
            ))
        })?,
    };

    Ok(Todo {
        id: TodoId(doc.id.clone()),
        text: text.to_string(),
        completed,
        created_at,
        priority,
    })
}

/// Decode a batch, skipping documents that are not valid todos.
pub fn todos_from_documents(docs: &[Document]) -> Vec<Todo> {
    let mut todos = Vec::with_capacity(docs.len());
    for doc in docs {
        match todo_from_document(doc) {
            Ok(todo) => todos.push(todo),
            Err(e) => warn!(id = %doc.id, error = %e, "skipping malformed document"),
        }
    }
    todos
}

/// Accepts RFC 3339 strings, epoch milliseconds, and `{seconds, nanoseconds}`.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        Value::Object(map) => {
            let seconds = map.get("seconds")?.as_i64()?;
            let nanos = map
                .get("nanoseconds")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, u32::try_from(nanos).ok()?).single()
        }
        _ => None,
    }
}

/// Fields for a newly created todo document.
pub fn new_todo_fields(todo: &NewTodo, created_at: DateTime<Utc>) -> Fields {
    let mut fields = Fields::new();
    fields.insert("text".into(), json!(todo.text()));
    fields.insert("completed".into(), json!(false));
    fields.insert("priority".into(), json!(todo.priority().as_str()));
    fields.insert("createdAt".into(), json!(created_at.to_rfc3339()));
    fields
}

/// Fields touched by a patch.
pub fn patch_fields(patch: &TodoPatch) -> Fields {
    let mut fields = Fields::new();
    if let Some(ref text) = patch.text {
        fields.insert("text".into(), json!(text));
    }
    if let Some(completed) = patch.completed {
        fields.insert("completed".into(), json!(completed));
    }
    if let Some(priority) = patch.priority {
        fields.insert("priority".into(), json!(priority.as_str()));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{CreateTodoInput, Validate};

    fn doc(data: Value) -> Document {
        Document::new("doc-1", data.as_object().cloned().unwrap())
    }

    #[test]
    fn test_full_document() {
        let todo = todo_from_document(&doc(json!({
            "text": "Call mom",
            "completed": true,
            "priority": "high",
            "createdAt": "2024-03-01T12:00:00Z",
        })))
        .unwrap();
        assert_eq!(todo.id, TodoId::from("doc-1"));
        assert_eq!(todo.text, "Call mom");
        assert!(todo.completed);
        assert_eq!(todo.priority, Priority::High);
        assert_eq!(todo.created_at.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn test_defaults_and_title_fallback() {
        let todo = todo_from_document(&doc(json!({"title": "Server todo"}))).unwrap();
        assert_eq!(todo.text, "Server todo");
        assert!(!todo.completed);
        assert_eq!(todo.priority, Priority::Medium);
        assert_eq!(todo.created_at.timestamp(), 0);
    }

    #[test]
    fn test_timestamp_shapes() {
        let millis = todo_from_document(&doc(json!({"text": "a", "createdAt": 1_700_000_000_000i64})))
            .unwrap();
        assert_eq!(millis.created_at.timestamp(), 1_700_000_000);

        let object = todo_from_document(&doc(json!({
            "text": "a",
            "createdAt": {"seconds": 1_700_000_000i64, "nanoseconds": 500}
        })))
        .unwrap();
        assert_eq!(object.created_at.timestamp(), 1_700_000_000);
        assert_eq!(object.created_at.timestamp_subsec_nanos(), 500);

        let bad = todo_from_document(&doc(json!({"text": "a", "createdAt": "yesterday"})));
        assert!(matches!(bad, Err(StoreError::Deserialization(_))));
    }

    #[test]
    fn test_batch_skips_malformed() {
        let docs = vec![
            doc(json!({"text": "ok"})),
            Document::new("doc-2", json!({"done": 1}).as_object().cloned().unwrap()),
        ];
        let todos = todos_from_documents(&docs);
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].text, "ok");
    }

    #[test]
    fn test_missing_text_is_an_error() {
        let result = todo_from_document(&doc(json!({"completed": false})));
        assert!(matches!(result, Err(StoreError::Deserialization(_))));
    }

    #[test]
    fn test_new_fields_roundtrip_through_document() {
        let new = CreateTodoInput::new("Write tests")
            .with_priority(Priority::Low)
            .validate()
            .unwrap();
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let fields = new_todo_fields(&new, now);
        let todo = todo_from_document(&Document::new("x", fields)).unwrap();
        assert_eq!(todo.text, "Write tests");
        assert_eq!(todo.priority, Priority::Low);
        assert_eq!(todo.created_at, now);
        assert!(!todo.completed);
    }

    #[test]
    fn test_patch_fields_only_touch_set_fields() {
        let fields = patch_fields(&TodoPatch::completed(true));
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["completed"], json!(true));
    }
}
