//! Local Worker
//!
//! In-process worker with a concurrent task registry.
//! Runs operation handlers on the current tokio runtime.

use dashmap::DashMap;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};

use super::events::WorkerEvent;
use super::handler::{FnHandler, OperationHandler, OperationRequest};
use crate::config::WorkerConfig;
use crate::tasks::{Options, Parameters, Task, TaskError, TaskId, TaskInfo, Worker};

/// Cancel switch for one in-flight run
struct InFlight {
    run: u64,
    cancel_tx: oneshot::Sender<()>,
}

/// Worker that owns a task registry and executes tasks locally
pub struct LocalWorker {
    /// Registered tasks (task_id -> Task)
    tasks: Arc<DashMap<TaskId, Task>>,
    /// Operation handlers (task_type -> handler)
    handlers: Arc<DashMap<String, Arc<dyn OperationHandler>>>,
    /// Runs currently executing (task_id -> cancel switch)
    in_flight: Arc<DashMap<TaskId, InFlight>>,
    /// Run sequence, so a stale run never settles a newer one
    next_run: AtomicU64,
    /// Event broadcaster
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl LocalWorker {
    /// Create a new worker with default settings
    pub fn new() -> Self {
        Self::from_config(&WorkerConfig::default())
    }

    /// Create a worker from configuration
    pub fn from_config(config: &WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            tasks: Arc::new(DashMap::new()),
            handlers: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            next_run: AtomicU64::new(1),
            event_tx,
        }
    }

    /// Subscribe to worker events
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Register the handler for a task type, replacing any previous one
    pub fn register_handler(&self, task_type: impl Into<String>, handler: Arc<dyn OperationHandler>) {
        let task_type = task_type.into();
        debug!("Registered handler: {}", task_type);
        self.handlers.insert(task_type, handler);
    }

    /// Register an async closure as the handler for a task type
    pub fn register_fn<F, Fut>(&self, task_type: impl Into<String>, f: F)
    where
        F: Fn(OperationRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        self.register_handler(task_type, Arc::new(FnHandler::new(f)));
    }

    pub fn has_handler(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Create a task bound to this worker
    pub fn create_task(
        self: &Arc<Self>,
        task_type: impl Into<String>,
        options: Options,
        parameters: Option<Parameters>,
    ) -> Task {
        Task::new(self.clone(), task_type, options, parameters)
    }

    /// Get a registered task by ID
    pub fn get_task(&self, task_id: &TaskId) -> Option<Task> {
        self.tasks.get(task_id).map(|t| t.clone())
    }

    pub fn is_registered(&self, task_id: &TaskId) -> bool {
        self.tasks.contains_key(task_id)
    }

    /// List all registered tasks
    pub fn list_tasks(&self) -> Vec<TaskInfo> {
        let tasks: Vec<Task> = self.tasks.iter().map(|t| t.value().clone()).collect();
        tasks.iter().map(Task::info).collect()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Count runs that have not settled yet
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Cancel every in-flight run and drop every registered task
    pub fn shutdown(&self) {
        info!("Shutting down worker with {} tasks", self.tasks.len());

        let tasks: Vec<Task> = self.tasks.iter().map(|t| t.value().clone()).collect();
        for task in tasks {
            self.cancel_task(&task);
            task.drop();
        }

        self.tasks.clear();
        info!("Worker shut down");
    }

    fn emit(&self, event: WorkerEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl Default for LocalWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl Worker for LocalWorker {
    fn register_task(&self, task: &Task) {
        self.tasks.insert(task.id(), task.clone());
        info!("Registered task: {} ({})", task.task_type(), task.id());
        self.emit(WorkerEvent::Registered {
            task_id: task.id(),
            task_type: task.task_type().to_string(),
        });
    }

    fn update_task(&self, task: &Task, _parameters: &Parameters) {
        self.emit(WorkerEvent::Updated { task_id: task.id() });
    }

    fn run_task(&self, task: &Task) {
        let handler = self.handlers.get(task.task_type()).map(|h| h.value().clone());
        let Some(handler) = handler else {
            warn!("No handler for task type: {}", task.task_type());
            task.fail(
                TaskError::new(
                    "unknown_task_type",
                    format!("No handler registered for {}", task.task_type()),
                )
                .with_extra("type", Value::String(task.task_type().to_string())),
            );
            return;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Cannot run task {} outside a tokio runtime", task.id());
                task.fail(TaskError::new("no_runtime", e.to_string()));
                return;
            }
        };

        let request = OperationRequest {
            task_id: task.id(),
            task_type: task.task_type().to_string(),
            options: task.options().clone(),
            parameters: task.parameters(),
        };

        let run = self.next_run.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.in_flight.insert(task.id(), InFlight { run, cancel_tx });

        self.emit(WorkerEvent::Started {
            task_id: task.id(),
            task_type: task.task_type().to_string(),
        });

        // The handler runs in its own task so a panic surfaces as a JoinError
        let mut work = runtime.spawn(async move { handler.handle(request).await });

        let task = task.clone();
        let in_flight = self.in_flight.clone();
        runtime.spawn(async move {
            let joined = tokio::select! {
                joined = &mut work => joined,
                _ = cancel_rx => {
                    work.abort();
                    return;
                }
            };

            // Settled by cancel_task, or superseded by a newer run
            if in_flight.remove_if(&task.id(), |_, f| f.run == run).is_none() {
                return;
            }

            match joined {
                Ok(Ok(value)) => task.succeed(value),
                Ok(Err(err)) => task.fail(err),
                Err(e) if e.is_panic() => {
                    error!("Handler panicked for task {} ({})", task.task_type(), task.id());
                    task.fail(TaskError::new("handler_panicked", "Operation handler panicked"));
                }
                Err(e) => task.fail(TaskError::new("cancelled", e.to_string())),
            }
        });
    }

    fn deregister_task(&self, task: &Task) {
        if self.tasks.remove(&task.id()).is_some() {
            info!("Deregistered task: {} ({})", task.task_type(), task.id());
            self.emit(WorkerEvent::Deregistered { task_id: task.id() });
        }
    }

    fn emit_task_error(&self, code: &str) {
        debug!("Task error: {}", code);
        self.emit(WorkerEvent::TaskError {
            code: code.to_string(),
        });
    }

    fn cancel_task(&self, task: &Task) -> bool {
        let Some((_, in_flight)) = self.in_flight.remove(&task.id()) else {
            return false;
        };

        let _ = in_flight.cancel_tx.send(());
        info!("Cancelled task: {} ({})", task.task_type(), task.id());
        self.emit(WorkerEvent::Cancelled { task_id: task.id() });
        task.fail(TaskError::new("cancelled", "Operation cancelled"));
        true
    }
}
