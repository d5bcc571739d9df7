//! Worker Events
//!
//! Broadcast events published by a worker. `TaskError` is the app-wide
//! `task-error` channel; the rest follow the registry.

use serde::{Deserialize, Serialize};

use crate::tasks::TaskId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerEvent {
    /// Task registered with the worker
    Registered { task_id: TaskId, task_type: String },

    /// Task parameters changed
    Updated { task_id: TaskId },

    /// Task handed to its operation handler
    Started { task_id: TaskId, task_type: String },

    /// In-flight run aborted
    Cancelled { task_id: TaskId },

    /// Task released from the registry
    Deregistered { task_id: TaskId },

    /// A task failed; carries the bare error code
    TaskError { code: String },
}

impl WorkerEvent {
    /// Task the event refers to, if any
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::Registered { task_id, .. }
            | Self::Updated { task_id }
            | Self::Started { task_id, .. }
            | Self::Cancelled { task_id }
            | Self::Deregistered { task_id } => Some(*task_id),
            Self::TaskError { .. } => None,
        }
    }

    /// Event channel name
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "task-registered",
            Self::Updated { .. } => "task-updated",
            Self::Started { .. } => "task-started",
            Self::Cancelled { .. } => "task-cancelled",
            Self::Deregistered { .. } => "task-deregistered",
            Self::TaskError { .. } => "task-error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_names() {
        let event = WorkerEvent::TaskError { code: "validation".to_string() };
        assert_eq!(event.event_name(), "task-error");
        assert_eq!(event.task_id(), None);

        let id = TaskId::new();
        let event = WorkerEvent::Deregistered { task_id: id };
        assert_eq!(event.event_name(), "task-deregistered");
        assert_eq!(event.task_id(), Some(id));
    }

    #[test]
    fn test_serialization_is_tagged() {
        let event = WorkerEvent::TaskError { code: "network".to_string() };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "taskError", "code": "network" })
        );
    }
}
