//! Task Handle
//!
//! A `Task` wraps one failable, observable, retryable operation. Execution is
//! delegated to a [`Worker`]; the task only tracks state, parameters and
//! listeners.
//!
//! State machine:
//! - `Idle --run()--> Running`
//! - `Running --succeed()--> Ended` (then released)
//! - `Running --fail()--> Idle` (re-runnable)
//! - `drop()` from any state marks the task dropped and deregisters it

use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use super::error::{LifecycleError, TaskError};
use super::events::{ListenerId, TaskEvents};
use super::types::{merge_parameters, Options, Parameters, TaskId, TaskInfo, TaskOutcome, TaskState};
use super::worker::Worker;

/// Mutable part of a task, guarded by one lock
struct TaskCore {
    state: TaskState,
    parameters: Parameters,
    dropped: bool,
}

struct TaskInner {
    id: TaskId,
    task_type: String,
    options: Options,
    created_at: DateTime<Utc>,
    worker: Arc<dyn Worker>,
    core: Mutex<TaskCore>,
    events: TaskEvents,
}

/// Handle to a single task; clones share the same task
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

/// Non-owning task handle
#[derive(Clone)]
pub struct WeakTask {
    inner: Weak<TaskInner>,
}

impl WeakTask {
    pub fn upgrade(&self) -> Option<Task> {
        self.inner.upgrade().map(|inner| Task { inner })
    }
}

impl Task {
    /// Create a task and register it with `worker`.
    ///
    /// The optional `parameters` seed is applied through [`Task::update`] after
    /// registration, so the worker sees one update for it.
    pub fn new(
        worker: Arc<dyn Worker>,
        task_type: impl Into<String>,
        options: Options,
        parameters: Option<Parameters>,
    ) -> Self {
        let task = Self {
            inner: Arc::new(TaskInner {
                id: TaskId::new(),
                task_type: task_type.into(),
                options,
                created_at: Utc::now(),
                worker,
                core: Mutex::new(TaskCore {
                    state: TaskState::Idle,
                    parameters: Parameters::new(),
                    dropped: false,
                }),
                events: TaskEvents::new(),
            }),
        };

        task.inner.worker.register_task(&task);
        debug!("Created task: {} ({})", task.inner.task_type, task.inner.id);

        if let Some(seed) = parameters {
            // A fresh task can only be dropped here by a misbehaving worker
            if let Err(e) = task.update(seed) {
                warn!("Could not seed parameters: {}", e);
            }
        }

        task
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn task_type(&self) -> &str {
        &self.inner.task_type
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Snapshot of the current parameters
    pub fn parameters(&self) -> Parameters {
        self.inner.core.lock().parameters.clone()
    }

    pub fn state(&self) -> TaskState {
        self.inner.core.lock().state
    }

    pub fn is_dropped(&self) -> bool {
        self.inner.core.lock().dropped
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn info(&self) -> TaskInfo {
        let core = self.inner.core.lock();
        TaskInfo {
            id: self.inner.id,
            task_type: self.inner.task_type.clone(),
            state: core.state,
            dropped: core.dropped,
            options: self.inner.options.clone(),
            parameters: core.parameters.clone(),
            created_at: self.inner.created_at.to_rfc3339(),
        }
    }

    /// Number of listeners currently attached across all channels
    pub fn listener_count(&self) -> usize {
        self.inner.events.listener_count()
    }

    pub fn downgrade(&self) -> WeakTask {
        WeakTask {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same task
    pub fn ptr_eq(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Shallow-merge `partial` into the parameters and notify the worker
    pub fn update(&self, partial: Parameters) -> Result<(), LifecycleError> {
        let snapshot = {
            let mut core = self.inner.core.lock();
            if core.dropped {
                return Err(LifecycleError::Dropped { id: self.inner.id });
            }
            merge_parameters(&mut core.parameters, partial);
            core.parameters.clone()
        };

        self.inner.worker.update_task(self, &snapshot);
        Ok(())
    }

    /// Hand the task to the worker. Only valid while idle.
    ///
    /// The eventual outcome is delivered through the event channels; use
    /// [`Task::run_once`] to await it instead.
    pub fn run(&self) -> Result<Task, LifecycleError> {
        {
            let mut core = self.inner.core.lock();
            if core.state != TaskState::Idle {
                return Err(LifecycleError::NotIdle {
                    id: self.inner.id,
                    state: core.state,
                });
            }
            if core.dropped {
                return Err(LifecycleError::Dropped { id: self.inner.id });
            }
            core.state = TaskState::Running;
        }

        debug!("Running task: {} ({})", self.inner.task_type, self.inner.id);
        self.inner.worker.run_task(self);
        Ok(self.clone())
    }

    /// Run the task and return a future for the first outcome
    pub fn run_once(&self) -> Result<Completion, LifecycleError> {
        let (listener, completion) = self.arm_completion();

        if let Err(e) = self.run() {
            self.inner.events.off(listener);
            return Err(e);
        }
        Ok(completion)
    }

    /// Like [`Task::run_once`], but the task is dropped on the first outcome
    /// whether it succeeded or failed
    pub fn run_once_and_drop(&self) -> Result<Completion, LifecycleError> {
        let (listener, completion) = self.arm_completion();

        let weak = self.downgrade();
        let dropper = self.inner.events.once_result(move |_| {
            if let Some(task) = weak.upgrade() {
                if !task.is_dropped() {
                    task.drop();
                }
            }
        });

        if let Err(e) = self.run() {
            self.inner.events.off(listener);
            self.inner.events.off(dropper);
            return Err(e);
        }
        Ok(completion)
    }

    fn arm_completion(&self) -> (ListenerId, Completion) {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));

        let listener = self.inner.events.once_result(move |outcome| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(outcome.clone());
            }
        });

        (listener, Completion { id: self.inner.id, rx })
    }

    /// Release the task: emit `drop`, deregister from the worker, and detach
    /// every listener.
    ///
    /// Returns `false` if the task was already dropped; nothing happens then.
    /// Dropping does not stop work the worker has already started.
    pub fn drop(&self) -> bool {
        {
            let mut core = self.inner.core.lock();
            if core.dropped {
                return false;
            }
            core.dropped = true;
        }

        self.inner.events.drop.emit(&());
        self.inner.worker.deregister_task(self);
        self.inner.events.close();

        debug!("Dropped task: {} ({})", self.inner.task_type, self.inner.id);
        true
    }

    /// Alias of [`Task::drop`]
    pub fn release(&self) -> bool {
        self.drop()
    }

    /// Ask the worker to abort in-flight work. Returns whether it did.
    pub fn cancel(&self) -> bool {
        self.inner.worker.cancel_task(self)
    }

    /// Called by the worker when the current run succeeded
    pub fn succeed(&self, result: Value) {
        let dropped = {
            let mut core = self.inner.core.lock();
            if core.state != TaskState::Running {
                warn!(
                    "Ignoring success for task {} in state {}",
                    self.inner.id, core.state
                );
                return;
            }
            core.state = TaskState::Ended;
            core.dropped
        };

        debug!("Task succeeded: {} ({})", self.inner.task_type, self.inner.id);
        if dropped {
            return;
        }

        self.inner.events.success.emit(&result);
        self.inner.events.result.emit(&TaskOutcome::Success(result));
        self.drop();
    }

    /// Called by the worker when the current run failed.
    ///
    /// The worker's task-error notification fires even when the task was
    /// dropped mid-run and its channels are closed.
    pub fn fail(&self, error: TaskError) {
        let dropped = {
            let mut core = self.inner.core.lock();
            if core.state != TaskState::Running {
                warn!(
                    "Ignoring failure for task {} in state {}",
                    self.inner.id, core.state
                );
                return;
            }
            core.state = TaskState::Idle;
            core.dropped
        };

        debug!(
            "Task failed: {} ({}): {}",
            self.inner.task_type, self.inner.id, error
        );
        let code = error.code.clone();
        if !dropped {
            self.inner.events.failure.emit(&error);
            self.inner.events.result.emit(&TaskOutcome::Failure(error));
        }
        self.inner.worker.emit_task_error(&code);
    }

    pub fn on_success(&self, f: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        self.inner.events.on_success(f)
    }

    pub fn on_failure(&self, f: impl Fn(&TaskError) + Send + Sync + 'static) -> ListenerId {
        self.inner.events.on_failure(f)
    }

    pub fn on_result(&self, f: impl Fn(&TaskOutcome) + Send + Sync + 'static) -> ListenerId {
        self.inner.events.on_result(f)
    }

    pub fn once_result(&self, f: impl Fn(&TaskOutcome) + Send + Sync + 'static) -> ListenerId {
        self.inner.events.once_result(f)
    }

    pub fn on_drop(&self, f: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.inner.events.on_drop(move |_| f())
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("type", &self.inner.task_type)
            .field("state", &core.state)
            .field("dropped", &core.dropped)
            .finish()
    }
}

/// Settles with the first outcome of a run started by `run_once`.
///
/// If the task is dropped before an outcome arrives, it settles with a
/// `task_dropped` error.
pub struct Completion {
    id: TaskId,
    rx: oneshot::Receiver<TaskOutcome>,
}

impl Completion {
    pub fn task_id(&self) -> TaskId {
        self.id
    }
}

impl Future for Completion {
    type Output = Result<Value, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome.into_result()),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskError::dropped_before_completion(this.id))),
            Poll::Pending => Poll::Pending,
        }
    }
}
