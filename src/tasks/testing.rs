//! Test doubles for the worker contract

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

use super::error::TaskError;
use super::task::Task;
use super::types::{Parameters, TaskId};
use super::worker::Worker;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Register(TaskId),
    Update(TaskId, Parameters),
    Run(TaskId),
    Deregister(TaskId),
    TaskError(String),
}

/// Worker that records every call and never completes tasks on its own,
/// unless built with [`RecordingWorker::failing_with`]
pub struct RecordingWorker {
    calls: Mutex<Vec<Call>>,
    fail_code: Option<String>,
}

impl RecordingWorker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_code: None,
        })
    }

    /// Fails every run synchronously from inside `run_task`
    pub fn failing_with(code: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_code: Some(code.to_string()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn task_errors(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::TaskError(code) => Some(code.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Worker for RecordingWorker {
    fn register_task(&self, task: &Task) {
        self.calls.lock().push(Call::Register(task.id()));
    }

    fn update_task(&self, task: &Task, parameters: &Parameters) {
        self.calls.lock().push(Call::Update(task.id(), parameters.clone()));
    }

    fn run_task(&self, task: &Task) {
        self.calls.lock().push(Call::Run(task.id()));
        if let Some(code) = &self.fail_code {
            task.fail(TaskError::new(code.clone(), "rejected by test worker"));
        }
    }

    fn deregister_task(&self, task: &Task) {
        self.calls.lock().push(Call::Deregister(task.id()));
    }

    fn emit_task_error(&self, code: &str) {
        self.calls.lock().push(Call::TaskError(code.to_string()));
    }
}

/// Unwrap a JSON object literal into a parameter map
pub fn object(value: Value) -> Parameters {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}
