//! Worker Contract
//!
//! The collaborator that owns the task registry and actually performs
//! operations. A task only ever talks to its worker through this trait.

use super::task::Task;
use super::types::Parameters;

/// Execution and registration authority for tasks
pub trait Worker: Send + Sync {
    /// Called once when the task is constructed
    fn register_task(&self, task: &Task);

    /// Called on every parameter update with the merged snapshot
    fn update_task(&self, task: &Task, parameters: &Parameters);

    /// Called on every run; must eventually call [`Task::succeed`] or [`Task::fail`]
    fn run_task(&self, task: &Task);

    /// Called once when the task is released
    fn deregister_task(&self, task: &Task);

    /// Worker-level `task-error` broadcast, keyed by error code
    fn emit_task_error(&self, code: &str);

    /// Abort in-flight work for the task, if the worker can.
    ///
    /// Returns whether anything was aborted. Workers without true abort keep
    /// the default, which does nothing.
    fn cancel_task(&self, _task: &Task) -> bool {
        false
    }
}
