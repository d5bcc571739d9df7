//! Task Error Types
//!
//! Two kinds of errors come out of a task. Operation errors are produced by the
//! worker and only ever travel through notification channels; lifecycle errors
//! are caller mistakes and are returned synchronously.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{TaskId, TaskState};

/// Failure reported by the worker for one run cycle
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct TaskError {
    /// Machine-readable error code, e.g. `validation`
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional context fields passed through from the worker
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            extra: Map::new(),
        }
    }

    /// Attach one extra context field
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Look up an extra context field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Error delivered to a pending completion whose task was dropped first
    pub(crate) fn dropped_before_completion(id: TaskId) -> Self {
        Self::new(
            "task_dropped",
            format!("Task {} was dropped before it completed", id),
        )
    }
}

/// Invalid use of a task's lifecycle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Task {id} cannot run while {state}")]
    NotIdle { id: TaskId, state: TaskState },

    #[error("Task {id} has been dropped")]
    Dropped { id: TaskId },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_is_code_and_message() {
        let err = TaskError::new("validation", "bad name");
        assert_eq!(err.to_string(), "validation: bad name");
    }

    #[test]
    fn test_extra_fields_flatten() {
        let err = TaskError::new("conflict", "already exists").with_extra("field", json!("email"));

        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(
            value,
            json!({ "code": "conflict", "message": "already exists", "field": "email" })
        );

        let back: TaskError = serde_json::from_value(value).unwrap();
        assert_eq!(back.get("field"), Some(&json!("email")));
    }

    #[test]
    fn test_lifecycle_messages() {
        let id = TaskId::new();
        let err = LifecycleError::NotIdle { id, state: TaskState::Running };
        assert_eq!(err.to_string(), format!("Task {} cannot run while running", id));
    }
}
