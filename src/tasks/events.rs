//! Task Events
//!
//! Typed notification channels attached to every task.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::error::TaskError;
use super::types::TaskOutcome;

/// Handle returned when attaching a listener, used to detach it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listener<T> {
    id: ListenerId,
    once: bool,
    callback: Callback<T>,
}

/// A single typed channel with persistent and single-fire listeners.
///
/// A closed channel holds no listeners and ignores new ones.
pub struct Channel<T> {
    listeners: Mutex<Option<Vec<Listener<T>>>>,
}

impl<T> Channel<T> {
    fn new() -> Self {
        Self {
            listeners: Mutex::new(Some(Vec::new())),
        }
    }

    fn attach(&self, id: ListenerId, once: bool, callback: Callback<T>) -> bool {
        match self.listeners.lock().as_mut() {
            Some(listeners) => {
                listeners.push(Listener { id, once, callback });
                true
            }
            None => false,
        }
    }

    fn detach(&self, id: ListenerId) -> bool {
        let mut guard = self.listeners.lock();
        let Some(listeners) = guard.as_mut() else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Deliver `payload` to every listener, returning how many were called.
    ///
    /// Single-fire listeners are removed before any callback runs, and no lock
    /// is held while callbacks run, so a callback may re-enter the task.
    pub(crate) fn emit(&self, payload: &T) -> usize {
        let callbacks: Vec<Callback<T>> = {
            let mut guard = self.listeners.lock();
            let Some(listeners) = guard.as_mut() else {
                return 0;
            };
            let callbacks = listeners.iter().map(|l| l.callback.clone()).collect();
            listeners.retain(|l| !l.once);
            callbacks
        };

        for callback in &callbacks {
            callback(payload);
        }
        callbacks.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn close(&self) {
        // Move the listeners out so their captures drop after the lock is released
        let drained = self.listeners.lock().take();
        drop(drained);
    }
}

/// The four channels a task exposes.
///
/// Closed when the task is dropped; listeners attached after that are never
/// stored and never fire.
pub struct TaskEvents {
    next_id: AtomicU64,
    pub(crate) success: Channel<Value>,
    pub(crate) failure: Channel<TaskError>,
    pub(crate) result: Channel<TaskOutcome>,
    pub(crate) drop: Channel<()>,
}

impl TaskEvents {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            success: Channel::new(),
            failure: Channel::new(),
            result: Channel::new(),
            drop: Channel::new(),
        }
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn on_success(&self, f: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id();
        self.success.attach(id, false, Arc::new(f));
        id
    }

    pub fn on_failure(&self, f: impl Fn(&TaskError) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id();
        self.failure.attach(id, false, Arc::new(f));
        id
    }

    pub fn on_result(&self, f: impl Fn(&TaskOutcome) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id();
        self.result.attach(id, false, Arc::new(f));
        id
    }

    /// Attach a `result` listener that fires at most once
    pub fn once_result(&self, f: impl Fn(&TaskOutcome) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id();
        self.result.attach(id, true, Arc::new(f));
        id
    }

    pub fn on_drop(&self, f: impl Fn(&()) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id();
        self.drop.attach(id, false, Arc::new(f));
        id
    }

    /// Detach a listener from whichever channel holds it
    pub fn off(&self, id: ListenerId) -> bool {
        self.success.detach(id)
            || self.failure.detach(id)
            || self.result.detach(id)
            || self.drop.detach(id)
    }

    /// Release every listener and refuse new ones
    pub(crate) fn close(&self) {
        self.success.close();
        self.failure.close();
        self.result.close();
        self.drop.close();
    }

    pub fn listener_count(&self) -> usize {
        self.success.len() + self.failure.len() + self.result.len() + self.drop.len()
    }
}

impl Default for TaskEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let read = {
            let count = count.clone();
            move || count.load(Ordering::SeqCst)
        };
        (count, read)
    }

    #[test]
    fn test_persistent_listener_fires_every_time() {
        let events = TaskEvents::new();
        let (count, read) = counter();
        events.on_success(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        events.success.emit(&json!(1));
        events.success.emit(&json!(2));
        assert_eq!(read(), 2);
    }

    #[test]
    fn test_once_listener_fires_once() {
        let events = TaskEvents::new();
        let (count, read) = counter();
        events.once_result(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = TaskOutcome::Success(json!(null));
        assert_eq!(events.result.emit(&outcome), 1);
        assert_eq!(events.result.emit(&outcome), 0);
        assert_eq!(read(), 1);
        assert!(events.result.is_empty());
    }

    #[test]
    fn test_off_detaches() {
        let events = TaskEvents::new();
        let (count, read) = counter();
        let id = events.on_failure(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        assert!(events.off(id));
        assert!(!events.off(id));
        events.failure.emit(&TaskError::new("e", "m"));
        assert_eq!(read(), 0);
    }

    #[test]
    fn test_ids_are_unique_across_channels() {
        let events = TaskEvents::new();
        let a = events.on_success(|_| {});
        let b = events.on_drop(|_| {});
        assert_ne!(a, b);

        assert!(events.off(b));
        assert_eq!(events.listener_count(), 1);
    }

    #[test]
    fn test_close_releases_listeners() {
        let events = TaskEvents::new();
        let held = Arc::new(());
        let captured = held.clone();
        events.on_drop(move |_| assert!(Arc::strong_count(&captured) > 0));
        assert_eq!(Arc::strong_count(&held), 2);

        events.close();
        assert_eq!(Arc::strong_count(&held), 1);
        assert_eq!(events.listener_count(), 0);
    }

    #[test]
    fn test_closed_channels_ignore_new_listeners() {
        let events = TaskEvents::new();
        events.close();

        let (count, read) = counter();
        let id = events.on_result(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(events.listener_count(), 0);
        assert_eq!(events.result.emit(&TaskOutcome::Success(json!(1))), 0);
        assert!(!events.off(id));
        assert_eq!(read(), 0);
    }
}
