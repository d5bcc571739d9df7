//! Worker Module
//!
//! In-process implementation of the worker contract:
//! - Concurrent task registry (DashMap)
//! - Operation handlers keyed by task type
//! - Broadcast events, including the app-wide `task-error` channel
//! - Abortable in-flight runs

pub mod events;
pub mod handler;
pub mod manager;

pub use events::WorkerEvent;
pub use handler::{FnHandler, OperationHandler, OperationRequest};
pub use manager::LocalWorker;
