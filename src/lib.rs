// Task lifecycle core for the AKSO membership client.
//
// A `Task` is a handle for one failable, observable, retryable operation;
// a `Worker` owns the registry and performs the work.

pub mod batch;
pub mod config;
pub mod tasks;
pub mod worker;

pub use batch::{BatchQueue, BatchReport};
pub use config::{Config, ConfigError};
pub use tasks::{Completion, LifecycleError, Task, TaskError, TaskOutcome, TaskState, Worker};
pub use worker::{LocalWorker, OperationHandler, OperationRequest, WorkerEvent};
