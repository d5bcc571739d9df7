//! Tasks Module
//!
//! A task is a handle for one failable, observable, retryable operation.
//! Execution is delegated to a [`Worker`]; the task owns its state machine,
//! its parameters and its notification channels.

pub mod error;
pub mod events;
pub mod task;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{LifecycleError, TaskError};
pub use events::{ListenerId, TaskEvents};
pub use task::{Completion, Task, WeakTask};
pub use types::{Options, Parameters, TaskId, TaskInfo, TaskOutcome, TaskState};
pub use worker::Worker;
