//! Push-based listener sets, one per session state slice.
//!
//! Listeners are invoked synchronously, in registration order, with a
//! snapshot of the slice. Registering replays the current snapshot to the
//! new listener before `subscribe` returns.

use std::sync::{Arc, Mutex, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub(crate) struct ListenerSet<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

struct Inner<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

impl<T: 'static> ListenerSet<T> {
    pub fn new() -> Self {
        ListenerSet {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register `callback`, replay `current` to it, and return a handle that
    /// removes it again. Removal never affects other listeners.
    pub fn subscribe(
        &self,
        current: &T,
        callback: impl Fn(&T) + Send + Sync + 'static,
    ) -> Subscription {
        let callback: Callback<T> = Arc::new(callback);

        let id = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.push((id, Arc::clone(&callback)));
            id
        };

        // Replay outside the lock so a callback that subscribes again
        // cannot deadlock.
        callback(current);

        let weak: Weak<Mutex<Inner<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.lock().unwrap();
                inner.entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Deliver a snapshot to every listener, in registration order.
    pub fn notify(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = {
            let inner = self.inner.lock().unwrap();
            inner.entries.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };

        for callback in callbacks {
            callback(value);
        }
    }
}

/// Removes a callback registered with one of the `subscribe_*` methods.
///
/// Dropping a `Subscription` without calling [`Subscription::cancel`] leaves
/// the callback registered for the life of the session.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Subscription {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Remove the callback. Other subscribers are unaffected.
    pub fn cancel(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}
