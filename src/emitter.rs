//! Multi-listener publish/subscribe primitive.
//!
//! An [`EventEmitter`] maps event names to an ordered list of handlers.
//! Handlers are plain closures; any state a handler needs is captured by the
//! closure itself rather than bound at registration time.
//!
//! # Removal
//!
//! - [`EventEmitter::off`] removes every registration of a handler for one
//!   event, matched by `Arc` identity.
//! - [`EventEmitter::remove_listener`] removes exactly one registration by
//!   the [`ListenerId`] returned from [`EventEmitter::on`].
//!
//! # Dispatch
//!
//! [`EventEmitter::emit`] snapshots the listener list and releases the lock
//! before invoking anything, so handlers may freely call `on`, `off` or even
//! `emit` on the same emitter. Changes made during a dispatch take effect on
//! the next one.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use websocket_registry::{EventEmitter, Handler};
//!
//! let emitter: EventEmitter<&'static str, u32> = EventEmitter::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//!
//! let counter = Arc::clone(&seen);
//! let handler: Handler<u32> = Arc::new(move |n: &u32| {
//!     counter.fetch_add(*n as usize, Ordering::SeqCst);
//! });
//!
//! emitter.on("tick", Arc::clone(&handler));
//! assert_eq!(emitter.emit(&"tick", &5), 1);
//!
//! emitter.off(&"tick", &handler);
//! assert_eq!(emitter.emit(&"tick", &5), 0);
//! assert_eq!(seen.load(Ordering::SeqCst), 5);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::identifiers::ListenerId;

// ============================================================================
// Types
// ============================================================================

/// Shared event handler.
///
/// Keep a clone of the `Arc` to remove the handler later with
/// [`EventEmitter::off`].
pub type Handler<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// One registration in a listener list.
struct Listener<P> {
    id: ListenerId,
    handler: Handler<P>,
    once: bool,
}

// ============================================================================
// EventEmitter
// ============================================================================

/// Ordered multi-listener event dispatcher.
///
/// `K` names the event, `P` is the payload handed to handlers.
/// Registering the same handler twice yields two independent invocations.
pub struct EventEmitter<K, P> {
    /// Listener lists by event name.
    listeners: Mutex<FxHashMap<K, Vec<Listener<P>>>>,
}

impl<K, P> Default for EventEmitter<K, P>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> fmt::Debug for EventEmitter<K, P>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock();
        let counts: Vec<_> = listeners.iter().map(|(k, v)| (k, v.len())).collect();
        f.debug_struct("EventEmitter")
            .field("listeners", &counts)
            .finish()
    }
}

// ============================================================================
// EventEmitter - Registration
// ============================================================================

impl<K, P> EventEmitter<K, P>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Creates an emitter with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(FxHashMap::default()),
        }
    }

    /// Appends `handler` to the listener list of `event`.
    pub fn on(&self, event: K, handler: Handler<P>) -> ListenerId {
        self.register(event, handler, false)
    }

    /// Registers a closure, returning both its id and the shared handler.
    ///
    /// The returned [`Handler`] can be passed to [`off`](Self::off).
    pub fn on_fn<F>(&self, event: K, f: F) -> (ListenerId, Handler<P>)
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        let handler: Handler<P> = Arc::new(f);
        let id = self.register(event, Arc::clone(&handler), false);
        (id, handler)
    }

    /// Registers `handler` for a single invocation of `event`.
    pub fn once(&self, event: K, handler: Handler<P>) -> ListenerId {
        self.register(event, handler, true)
    }

    fn register(&self, event: K, handler: Handler<P>, once: bool) -> ListenerId {
        let id = ListenerId::next();
        trace!(event = ?event, listener = %id, once, "Listener registered");
        self.listeners
            .lock()
            .entry(event)
            .or_default()
            .push(Listener { id, handler, once });
        id
    }

    /// Removes every registration of `handler` for `event`.
    ///
    /// Returns how many registrations were removed. Unknown handlers and
    /// unknown events are a no-op.
    pub fn off(&self, event: &K, handler: &Handler<P>) -> usize {
        let mut listeners = self.listeners.lock();
        let Some(list) = listeners.get_mut(event) else {
            return 0;
        };

        let before = list.len();
        list.retain(|l| !Arc::ptr_eq(&l.handler, handler));
        let removed = before - list.len();

        if list.is_empty() {
            listeners.remove(event);
        }

        trace!(event = ?event, removed, "Listeners removed");
        removed
    }

    /// Removes the single registration identified by `id`.
    ///
    /// Returns `false` if it was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let mut emptied = None;
        let mut found = false;

        for (event, list) in listeners.iter_mut() {
            if let Some(pos) = list.iter().position(|l| l.id == id) {
                list.remove(pos);
                found = true;
                if list.is_empty() {
                    emptied = Some(event.clone());
                }
                break;
            }
        }

        if let Some(event) = emptied {
            listeners.remove(&event);
        }

        found
    }

    /// Drops every listener for every event.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

// ============================================================================
// EventEmitter - Dispatch
// ============================================================================

impl<K, P> EventEmitter<K, P>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Invokes every handler registered for `event`, in registration order.
    ///
    /// Returns the number of handlers invoked. Emitting an event nobody
    /// listens to is a no-op.
    pub fn emit(&self, event: &K, payload: &P) -> usize {
        let snapshot: Vec<Handler<P>> = {
            let mut listeners = self.listeners.lock();
            let Some(list) = listeners.get_mut(event) else {
                return 0;
            };

            let snapshot = list.iter().map(|l| Arc::clone(&l.handler)).collect();

            list.retain(|l| !l.once);
            if list.is_empty() {
                listeners.remove(event);
            }

            snapshot
        };

        for handler in &snapshot {
            handler(payload);
        }

        trace!(event = ?event, handlers = snapshot.len(), "Event emitted");
        snapshot.len()
    }

    /// Returns the number of registrations for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &K) -> usize {
        self.listeners.lock().get(event).map_or(0, Vec::len)
    }

    /// Returns `true` if no event has any listener.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
