//! # Listener Registry
//!
//! Observer registry behind the handler's `ready`, `error` and per-intention
//! events. Each event has its own [`ListenerSet`]; every registration returns a
//! [`Subscription`] that can remove it again.
//!
//! One-shot registrations are removed from the set under the same lock that
//! selects them for an emission, before they are invoked. Two concurrent
//! emissions can therefore never both observe the same one-shot listener.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

use super::types::{ErrorListener, IntentionListener, ReadyListener};
use crate::messaging::errors::BrokerError;
use crate::messaging::message::IntentionKind;

struct Entry<L> {
    id: u64,
    once: bool,
    listener: L,
}

struct SetInner<L> {
    name: &'static str,
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry<L>>>,
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64) -> bool;
}

impl<L: Send> Detach for SetInner<L> {
    fn detach(&self, id: u64) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        before != entries.len()
    }
}

/// Handle to a registered listener.
///
/// Dropping the handle leaves the listener registered.
pub struct Subscription {
    id: u64,
    event: &'static str,
    owner: Weak<dyn Detach>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the event this subscription listens to
    pub fn event(&self) -> &'static str {
        self.event
    }

    /// Remove the listener. Returns `false` if it had already fired (one-shot)
    /// or was removed before.
    pub fn unsubscribe(self) -> bool {
        match self.owner.upgrade() {
            Some(owner) => owner.detach(self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event", &self.event)
            .finish()
    }
}

/// Ordered set of listeners for one event
pub struct ListenerSet<L> {
    inner: Arc<SetInner<L>>,
}

impl<L> Clone for ListenerSet<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<L: Send + 'static> ListenerSet<L> {
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(SetInner {
                name,
                next_id: AtomicU64::new(1),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a persistent listener
    pub fn add(&self, listener: L) -> Subscription {
        self.insert(listener, false)
    }

    /// Register a listener removed on its first emission
    pub fn add_once(&self, listener: L) -> Subscription {
        self.insert(listener, true)
    }

    fn insert(&self, listener: L, once: bool) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.entries.lock().push(Entry { id, once, listener });

        let owner: Weak<dyn Detach> = Arc::downgrade(&self.inner) as Weak<dyn Detach>;
        Subscription {
            id,
            event: self.inner.name,
            owner,
        }
    }

    /// Remove and return one listener by id
    pub fn take(&self, id: u64) -> Option<L> {
        let mut entries = self.inner.entries.lock();
        let position = entries.iter().position(|entry| entry.id == id)?;
        Some(entries.remove(position).listener)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }
}

impl<L: Clone + Send + 'static> ListenerSet<L> {
    /// Select the listeners for one emission, in registration order.
    ///
    /// One-shot entries are removed before the lock is released.
    pub fn select_for_emit(&self) -> Vec<L> {
        let mut entries = self.inner.entries.lock();
        let selected = entries.iter().map(|entry| entry.listener.clone()).collect();
        entries.retain(|entry| !entry.once);
        selected
    }
}

/// All listener sets of one broker handler
pub struct EventRegistry {
    ready: ListenerSet<ReadyListener>,
    error: ListenerSet<ErrorListener>,
    intentions: HashMap<IntentionKind, ListenerSet<IntentionListener>>,
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRegistry {
    pub fn new() -> Self {
        let intentions = IntentionKind::ALL
            .iter()
            .map(|kind| (*kind, ListenerSet::new(intention_event_name(*kind))))
            .collect();

        Self {
            ready: ListenerSet::new("ready"),
            error: ListenerSet::new("error"),
            intentions,
        }
    }

    pub fn ready(&self) -> &ListenerSet<ReadyListener> {
        &self.ready
    }

    pub fn error(&self) -> &ListenerSet<ErrorListener> {
        &self.error
    }

    /// Listener set for an intention group
    pub fn intention(&self, kind: IntentionKind) -> &ListenerSet<IntentionListener> {
        // Every kind is inserted in `new`
        &self.intentions[&kind]
    }

    /// Deliver an error event to every error listener.
    ///
    /// Listener panics are logged and do not stop the remaining listeners.
    pub fn emit_error(&self, err: &BrokerError) {
        let listeners = self.error.select_for_emit();

        if listeners.is_empty() {
            warn!(error = %err, "⚠️ Broker error raised with no error listeners");
            return;
        }

        debug!(
            error = %err,
            listeners = listeners.len(),
            "Emitting broker error event"
        );

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(err))).is_err() {
                error!(error = %err, "❌ Error listener panicked");
            }
        }
    }
}

fn intention_event_name(kind: IntentionKind) -> &'static str {
    match kind {
        IntentionKind::Create => "create",
        IntentionKind::Read => "query",
        IntentionKind::Update => "update",
        IntentionKind::Delete => "delete",
        IntentionKind::Other => "any",
    }
}
