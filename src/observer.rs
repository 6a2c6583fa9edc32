// src/observer.rs

//! Synchronous observer lists for the dependency state machines.
//!
//! A [`Observers`] value is a cheap, cloneable handle to a shared list of
//! handlers. The Prober and the Idle Timer each own one and publish their
//! events through it; any number of handlers may subscribe, and each
//! subscription can be detached again through the [`SubscriptionId`] returned
//! by [`Observers::subscribe`].
//!
//! Handlers run on the emitting task, in subscription order, while the list
//! lock is held. They must be short and must not subscribe or unsubscribe from
//! inside the callback; the handlers used by the orchestrator only push a
//! `RuntimeEvent` onto the runtime channel.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Boxed event handler.
pub type Handler<E> = Box<dyn FnMut(&E) + Send>;

/// Identifies one subscription on one observer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct ObserverList<E> {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler<E>)>,
}

pub struct Observers<E> {
    inner: Arc<Mutex<ObserverList<E>>>,
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ObserverList {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    /// Attach a handler; it sees every event emitted after this call.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: FnMut(&E) + Send + 'static,
    {
        let mut list = self.lock();
        let id = SubscriptionId(list.next_id);
        list.next_id += 1;
        list.handlers.push((id, Box::new(handler)));
        id
    }

    /// Detach a handler. Returns `false` if it was not (or no longer) attached.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut list = self.lock();
        let before = list.handlers.len();
        list.handlers.retain(|(sid, _)| *sid != id);
        list.handlers.len() != before
    }

    pub fn emit(&self, event: &E) {
        let mut list = self.lock();
        for (_, handler) in list.handlers.iter_mut() {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, ObserverList<E>> {
        // A panicking handler poisons the lock; the list itself is still
        // consistent, so keep serving it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<E> Clone for Observers<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("subscribers", &self.len())
            .finish()
    }
}
