use std::sync::{Arc, Mutex, PoisonError};

/// Single-item, latest-wins container shared between one producer and any number of readers.
///
/// `put` replaces whatever is stored; an unread value is simply dropped. `get` hands out
/// the current value without consuming it, so every reader sees the same value until the
/// next `put`. The lock only guards the pointer swap/clone, never the payload.
#[derive(Debug)]
pub struct SharedSlot<T> {
    inner: Mutex<Option<Arc<T>>>,
}

impl<T> SharedSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub fn put(&self, value: T) {
        self.put_arc(Arc::new(value));
    }

    pub fn put_arc(&self, value: Arc<T>) {
        // Drop the previous value after releasing the lock
        let _previous = {
            let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            guard.replace(value)
        };
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T> Default for SharedSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
