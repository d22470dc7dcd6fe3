use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mutex-guarded deque shared between the reactor thread and application
/// threads. Every push wakes one waiting consumer.
pub struct ThreadsafeQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> Default for ThreadsafeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ThreadsafeQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    pub fn push_back(&self, item: T) {
        lock(&self.items).push_back(item);
        self.available.notify_one();
    }

    pub fn push_front(&self, item: T) {
        lock(&self.items).push_front(item);
        self.available.notify_one();
    }

    pub fn pop_front(&self) -> Option<T> {
        lock(&self.items).pop_front()
    }

    pub fn pop_back(&self) -> Option<T> {
        lock(&self.items).pop_back()
    }

    /// Peeks at the front item without cloning it.
    pub fn front_map<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        lock(&self.items).front().map(f)
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn clear(&self) {
        lock(&self.items).clear();
    }

    /// Blocks until the queue holds at least one item.
    pub fn wait(&self) {
        let guard = lock(&self.items);
        let _guard = self
            .available
            .wait_while(guard, |items| items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`. Returns true if
    /// the queue is non-empty on return.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = lock(&self.items);
        let (guard, _) = self
            .available
            .wait_timeout_while(guard, timeout, |items| items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        !guard.is_empty()
    }
}

impl<T: Clone> ThreadsafeQueue<T> {
    pub fn front(&self) -> Option<T> {
        lock(&self.items).front().cloned()
    }

    pub fn back(&self) -> Option<T> {
        lock(&self.items).back().cloned()
    }
}
