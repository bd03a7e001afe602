//! Reactive state container.
//!
//! State lives behind an `Arc` inside a `tokio::sync::watch` channel. Every
//! write swaps in a new `Arc`, never mutating the old one, so a subscriber
//! holding a previous snapshot can detect change with `Arc::ptr_eq`.
//!
//! Writers must not call back into the same store from inside an update
//! closure; the channel's write lock is held while the closure runs.

use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable handle to shared, immutably-replaced state.
pub struct Store<S> {
    tx: Arc<watch::Sender<Arc<S>>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<S: Default> Default for Store<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S> Store<S> {
    /// Create a store holding `initial`.
    #[must_use]
    pub fn new(initial: S) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// Current snapshot.
    #[must_use]
    pub fn get(&self) -> Arc<S> {
        Arc::clone(&self.tx.borrow())
    }

    /// Read the live state without cloning the snapshot handle.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Replace the whole state.
    pub fn set(&self, state: S) {
        self.tx.send_replace(Arc::new(state));
    }

    /// Atomically derive the next state from the current one.
    pub fn update(&self, f: impl FnOnce(&S) -> S) {
        self.tx.send_modify(|current| {
            let next = f(current);
            *current = Arc::new(next);
        });
    }

    /// Atomically derive the next state, or leave it untouched when `f`
    /// returns `None`. Subscribers are only notified on change.
    ///
    /// Returns whether the state was replaced.
    pub fn update_if(&self, f: impl FnOnce(&S) -> Option<S>) -> bool {
        self.tx.send_if_modified(|current| match f(current) {
            Some(next) => {
                *current = Arc::new(next);
                true
            }
            None => false,
        })
    }

    /// Subscribe to whole-state snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<S>> {
        self.tx.subscribe()
    }

    /// Watch a single slice of the state.
    ///
    /// The watcher only wakes when the selected `Arc` is a different
    /// allocation than the one it last saw.
    pub fn select<T, F>(&self, selector: F) -> SliceWatcher<S, T, F>
    where
        F: Fn(&S) -> Arc<T>,
    {
        let rx = self.tx.subscribe();
        let last = selector(&rx.borrow());
        SliceWatcher { rx, selector, last }
    }
}

/// Subscription to one slice of a [`Store`].
pub struct SliceWatcher<S, T, F> {
    rx: watch::Receiver<Arc<S>>,
    selector: F,
    last: Arc<T>,
}

impl<S, T, F> SliceWatcher<S, T, F>
where
    F: Fn(&S) -> Arc<T>,
{
    /// The slice as last observed.
    #[must_use]
    pub fn current(&self) -> Arc<T> {
        Arc::clone(&self.last)
    }

    /// Wait until the slice changes. Returns `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Arc<T>> {
        loop {
            self.rx.changed().await.ok()?;
            let state = Arc::clone(&self.rx.borrow_and_update());
            let next = (self.selector)(&state);
            if !Arc::ptr_eq(&next, &self.last) {
                self.last = Arc::clone(&next);
                return Some(next);
            }
        }
    }
}
