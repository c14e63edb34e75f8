//! Input validation shared by the store and the server resource.
//!
//! Validation failures are reported as a map from field path to the first
//! message recorded for that path. Shape errors (a body that cannot be
//! decoded at all) land under [`FORM_PATH`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{NewTodo, Priority, TodoPatch};

/// Path used for errors that do not belong to a single field.
pub const FORM_PATH: &str = "_form";

pub const TEXT_REQUIRED: &str = "Text is required";

/// Field path → first error message for that path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(path, message);
        errors
    }

    /// Record an error. Later messages for an already-failed path are ignored.
    pub fn add(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.entry(path.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `Ok(value)` when nothing was recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (path, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", path, message)?;
            first = false;
        }
        Ok(())
    }
}

/// A schema check producing typed, validated output.
pub trait Validate {
    type Output;

    fn validate(&self) -> Result<Self::Output, ValidationErrors>;
}

/// Decode a raw JSON body and validate it.
pub fn validate_json<V>(raw: &serde_json::Value) -> Result<V::Output, ValidationErrors>
where
    V: Validate + DeserializeOwned,
{
    let input: V = serde_json::from_value(raw.clone())
        .map_err(|e| ValidationErrors::single(FORM_PATH, format!("Invalid payload: {}", e)))?;
    input.validate()
}

fn check_priority(raw: Option<&str>, errors: &mut ValidationErrors) -> Option<Priority> {
    let raw = raw?;
    match raw.parse::<Priority>() {
        Ok(priority) => Some(priority),
        Err(e) => {
            for (path, message) in e.iter() {
                errors.add(path, message);
            }
            None
        }
    }
}

/// Raw input for creating a todo.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTodoInput {
    #[serde(default, alias = "title")]
    pub text: String,
    #[serde(default)]
    pub priority: Option<String>,
}

impl CreateTodoInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            priority: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority.as_str().to_string());
        self
    }
}

impl Validate for CreateTodoInput {
    type Output = NewTodo;

    fn validate(&self) -> Result<NewTodo, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let text = self.text.trim();
        if text.is_empty() {
            errors.add("text", TEXT_REQUIRED);
        }
        let priority = check_priority(self.priority.as_deref(), &mut errors).unwrap_or_default();
        errors.into_result(NewTodo {
            text: text.to_string(),
            priority,
        })
    }
}

/// Raw input for updating a todo.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTodoInput {
    #[serde(default, alias = "title")]
    pub text: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub priority: Option<String>,
}

impl Validate for UpdateTodoInput {
    type Output = TodoPatch;

    fn validate(&self) -> Result<TodoPatch, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let priority = check_priority(self.priority.as_deref(), &mut errors);
        let patch = TodoPatch {
            text: self.text.clone(),
            completed: self.completed,
            priority,
        };
        match patch.normalized() {
            Ok(patch) => errors.into_result(patch),
            Err(more) => {
                for (path, message) in more.iter() {
                    errors.add(path, message);
                }
                Err(errors)
            }
        }
    }
}
