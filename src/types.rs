//! Core types for the todo store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::validation::ValidationErrors;

/// Unique identifier for a todo.
///
/// Either a random UUID generated locally (offline mode) or the document id
/// assigned by the gateway (live mode).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(pub String);

impl TodoId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        TodoId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TodoId({})", self.0)
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TodoId {
    fn from(s: &str) -> Self {
        TodoId(s.to_string())
    }
}

impl From<String> for TodoId {
    fn from(s: String) -> Self {
        TodoId(s)
    }
}

/// Todo priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    /// Sort rank: high sorts first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ValidationErrors;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(ValidationErrors::single(
                "priority",
                "Priority must be one of low, medium, high",
            )),
        }
    }
}

/// A single todo.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: TodoId,
    #[serde(alias = "title")]
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    /// Creation time, immutable once set.
    pub created_at: DateTime<Utc>,
    /// Records written before priorities existed have no field; they read as medium.
    #[serde(default)]
    pub priority: Priority,
}

impl Todo {
    /// Apply a normalized patch in place.
    pub fn apply(&mut self, patch: &TodoPatch) {
        if let Some(ref text) = patch.text {
            self.text = text.clone();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
    }
}

/// A validated, not yet persisted todo.
///
/// Only obtainable through [`crate::validation::CreateTodoInput`], so the text
/// is always trimmed and non-empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTodo {
    pub(crate) text: String,
    pub(crate) priority: Priority,
}

impl NewTodo {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Materialize with an id and creation time.
    pub fn into_todo(self, id: TodoId, created_at: DateTime<Utc>) -> Todo {
        Todo {
            id,
            text: self.text,
            completed: false,
            created_at,
            priority: self.priority,
        }
    }
}

/// Partial update of a todo. Unset fields are left alone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TodoPatch {
    pub text: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
}

impl TodoPatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn priority(priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.completed.is_none() && self.priority.is_none()
    }

    /// Trim the text and reject empty text or an empty patch.
    pub fn normalized(self) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.is_empty() {
            errors.add(crate::validation::FORM_PATH, "At least one field is required");
        }
        let text = match self.text {
            Some(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    errors.add("text", crate::validation::TEXT_REQUIRED);
                }
                Some(trimmed.to_string())
            }
            None => None,
        };
        errors.into_result(Self { text, ..self })
    }
}

/// Which todos a projection keeps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    #[default]
    All,
    Active,
    Completed,
}

impl Filter {
    pub fn matches(self, todo: &Todo) -> bool {
        match self {
            Filter::All => true,
            Filter::Active => !todo.completed,
            Filter::Completed => todo.completed,
        }
    }
}

impl FromStr for Filter {
    type Err = ValidationErrors;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Filter::All),
            "active" => Ok(Filter::Active),
            "completed" => Ok(Filter::Completed),
            _ => Err(ValidationErrors::single(
                "filter",
                "Filter must be one of all, active, completed",
            )),
        }
    }
}

/// How a projection orders todos.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Newest first.
    #[default]
    Date,
    /// High priority first.
    Priority,
    /// By text, ascending.
    Alphabetical,
}

impl FromStr for SortOrder {
    type Err = ValidationErrors;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(SortOrder::Date),
            "priority" => Ok(SortOrder::Priority),
            "alphabetical" => Ok(SortOrder::Alphabetical),
            _ => Err(ValidationErrors::single(
                "sort",
                "Sort must be one of date, priority, alphabetical",
            )),
        }
    }
}

/// Caller identity supplied by the auth layer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

/// Which consistency strategy backs a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// Local persisted cache; mutations are visible immediately.
    Offline,
    /// Remote gateway with push snapshots; mutations become visible eventually.
    Live,
}
