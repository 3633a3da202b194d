//! # Observer List
//!
//! Explicit subscribe/notify used by the connectivity monitor and the sync
//! engine. Subscribing returns a [`Subscription`]; dropping it removes the
//! callback.
//!
//! ```rust,ignore
//! let sub = monitor.subscribe(|state| println!("now {state}"));
//! // ...
//! drop(sub); // callback removed
//! ```

use std::sync::{Arc, Mutex, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: u64,
    callback: Callback<T>,
}

struct Inner<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

/// A list of callbacks notified with `&T`.
pub struct Observers<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Observers<T> {
    fn clone(&self) -> Self {
        Observers {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Observers {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }
}

impl<T: 'static> Observers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.push(Entry {
                id,
                callback: Arc::new(callback),
            });
            id
        };

        let weak: Weak<Mutex<Inner<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                    inner.entries.retain(|entry| entry.id != id);
                }
            })),
        }
    }

    /// Calls every registered callback.
    ///
    /// Callbacks run outside the lock, so a callback may subscribe or
    /// unsubscribe without deadlocking.
    pub fn notify(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = {
            let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.entries.iter().map(|entry| Arc::clone(&entry.callback)).collect()
        };

        for callback in callbacks {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Disposer returned by `subscribe`.
#[must_use = "dropping a Subscription unsubscribes immediately; call detach() to keep it"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Removes the callback now.
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    /// Keeps the callback registered for as long as the list lives.
    pub fn detach(mut self) {
        self.remove = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_drop_unsubscribes() {
        let observers: Observers<u32> = Observers::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let sub = observers.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        observers.notify(&1);
        drop(sub);
        observers.notify(&2);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(observers.is_empty());
    }

    #[test]
    fn test_detach_keeps_callback() {
        let observers: Observers<u32> = Observers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        observers
            .subscribe(move |v| sink.lock().unwrap().push(*v))
            .detach();

        observers.notify(&7);
        observers.notify(&8);
        assert_eq!(*seen.lock().unwrap(), vec![7, 8]);
        assert_eq!(observers.len(), 1);
    }

    #[test]
    fn test_unsubscribe_only_removes_own_callback() {
        let observers: Observers<u32> = Observers::new();
        let a = observers.subscribe(|_| {});
        let b = observers.subscribe(|_| {});

        a.unsubscribe();
        assert_eq!(observers.len(), 1);
        drop(b);
        assert!(observers.is_empty());
    }
}
