//! Task Types
//!
//! Type definitions shared by the task handle and its worker.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::error::TaskError;

/// Mutable, caller-editable input to an operation
pub type Parameters = Map<String, Value>;

/// Immutable context supplied when a task is created
pub type Options = Map<String, Value>;

/// Process-unique task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(uuid::Uuid);

impl TaskId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Task state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Task is waiting to be run (initial, and again after a failure)
    #[default]
    Idle,
    /// Task has been handed to the worker
    Running,
    /// Task completed successfully
    Ended,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// Outcome of one run cycle, delivered on the `result` channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "payload", rename_all = "lowercase")]
pub enum TaskOutcome {
    Success(Value),
    Failure(TaskError),
}

impl TaskOutcome {
    /// Tag naming which branch fired
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Failure(_) => "failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Convert into a plain `Result`
    pub fn into_result(self) -> Result<Value, TaskError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(err) => Err(err),
        }
    }
}

/// Task snapshot for listings and display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: String,
    pub state: TaskState,
    pub dropped: bool,
    pub options: Options,
    pub parameters: Parameters,
    pub created_at: String,
}

/// Shallow-merge `partial` into `target`; later keys win
pub(crate) fn merge_parameters(target: &mut Parameters, partial: Parameters) {
    for (key, value) in partial {
        target.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Parameters {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_merge_last_write_wins() {
        let mut target = params(json!({ "name": "Zamenhof", "born": 1859 }));
        merge_parameters(&mut target, params(json!({ "name": "L.L. Zamenhof" })));
        merge_parameters(&mut target, params(json!({ "died": 1917 })));

        assert_eq!(
            Value::Object(target),
            json!({ "name": "L.L. Zamenhof", "born": 1859, "died": 1917 })
        );
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_value(TaskState::Idle).unwrap(), json!("idle"));
        assert_eq!(TaskState::Ended.to_string(), "ended");
        assert_eq!(TaskState::default(), TaskState::Idle);
    }

    #[test]
    fn test_outcome_tag() {
        let ok = TaskOutcome::Success(json!(42));
        let err = TaskOutcome::Failure(TaskError::new("validation", "bad name"));

        assert_eq!(ok.tag(), "success");
        assert_eq!(err.tag(), "failure");
        assert_eq!(ok.into_result().unwrap(), json!(42));
        assert_eq!(err.into_result().unwrap_err().code, "validation");
    }
}
