//! Batch Queue
//!
//! Runs a list of items through tasks strictly one at a time. Each item gets a
//! fresh task that is awaited with `run_once_and_drop`; an item that fails is
//! re-enqueued at the tail until it runs out of attempts.

use log::{debug, info, warn};
use serde_json::Value;
use std::collections::VecDeque;

use crate::config::BatchConfig;
use crate::tasks::{LifecycleError, Task, TaskError};

struct Queued<T> {
    item: T,
    attempts: u32,
}

/// Settled item in a batch report
#[derive(Debug, Clone)]
pub struct Settled<T, R> {
    pub item: T,
    pub attempts: u32,
    pub outcome: R,
}

#[derive(Debug, Clone)]
pub struct BatchReport<T> {
    pub succeeded: Vec<Settled<T, Value>>,
    pub failed: Vec<Settled<T, TaskError>>,
}

impl<T> BatchReport<T> {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Progress notification for one attempt
#[derive(Debug)]
pub struct Attempt<'a, T> {
    pub item: &'a T,
    pub attempt: u32,
    pub result: &'a Result<Value, TaskError>,
    /// Whether the item went back into the queue
    pub requeued: bool,
}

/// Sequential work queue with tail re-enqueue on failure
pub struct BatchQueue<T> {
    queue: VecDeque<Queued<T>>,
    max_attempts: u32,
}

impl<T> BatchQueue<T> {
    pub fn new(items: impl IntoIterator<Item = T>, config: &BatchConfig) -> Self {
        Self {
            queue: items
                .into_iter()
                .map(|item| Queued { item, attempts: 0 })
                .collect(),
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drain the queue, building one task per attempt with `make_task`
    pub async fn run<F>(self, make_task: F) -> Result<BatchReport<T>, LifecycleError>
    where
        F: FnMut(&T) -> Task,
    {
        self.run_with_progress(make_task, |_| {}).await
    }

    /// Like [`BatchQueue::run`], reporting every attempt to `progress`.
    ///
    /// A task that cannot be started is a caller bug and aborts the batch.
    pub async fn run_with_progress<F, P>(
        mut self,
        mut make_task: F,
        mut progress: P,
    ) -> Result<BatchReport<T>, LifecycleError>
    where
        F: FnMut(&T) -> Task,
        P: FnMut(&Attempt<'_, T>),
    {
        let mut report = BatchReport {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };

        info!("Starting batch of {} items", self.queue.len());

        while let Some(mut queued) = self.queue.pop_front() {
            queued.attempts += 1;
            let task = make_task(&queued.item);
            debug!(
                "Batch item attempt {}/{} as task {}",
                queued.attempts,
                self.max_attempts,
                task.id()
            );

            let result = task.run_once_and_drop()?.await;
            let requeued = result.is_err() && queued.attempts < self.max_attempts;

            progress(&Attempt {
                item: &queued.item,
                attempt: queued.attempts,
                result: &result,
                requeued,
            });

            match result {
                Ok(value) => report.succeeded.push(Settled {
                    item: queued.item,
                    attempts: queued.attempts,
                    outcome: value,
                }),
                Err(_) if requeued => self.queue.push_back(queued),
                Err(err) => {
                    warn!(
                        "Batch item gave up after {} attempts: {}",
                        queued.attempts, err
                    );
                    report.failed.push(Settled {
                        item: queued.item,
                        attempts: queued.attempts,
                        outcome: err,
                    });
                }
            }
        }

        info!(
            "Batch finished: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
