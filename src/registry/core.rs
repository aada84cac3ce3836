//! Connection registry.
//!
//! The [`SocketRegistry`] is the get-or-create cache for connections. It is
//! meant to be owned by the application's composition root and passed to
//! consumers explicitly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                SocketRegistry               │
//! │  ┌───────────────────────────────────────┐  │
//! │  │ ws://example.com:7000 → Connection 1  │  │
//! │  │ ws://example.com:7001 → Connection 2  │  │
//! │  └───────────────────────────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! An entry leaves the map when `close_socket_for` is called for its key or
//! when its socket closes on its own. Nothing is evicted for being idle.

// ============================================================================
// Imports
// ============================================================================

use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info, trace};

use crate::connection::{CloseHook, Connection};
use crate::error::Result;
use crate::key::ConnectionKey;
use crate::transport::{self, TransportFactory};

use super::builder::RegistryBuilder;
use super::options::RegistryOptions;

// ============================================================================
// Types
// ============================================================================

/// Live connections by key.
type SocketMap = FxHashMap<ConnectionKey, Connection>;

// ============================================================================
// SocketRegistry
// ============================================================================

/// Get-or-create cache of connections keyed by normalized target.
///
/// At most one live connection exists per key. The map is guarded so that
/// transport events arriving on Tokio tasks can remove closed entries, but
/// callers should still treat one registry as owned by one component.
///
/// # Example
///
/// ```
/// use websocket_registry::{MockNetwork, SocketRegistry};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> websocket_registry::Result<()> {
/// let network = MockNetwork::new();
/// let _server = network.bind("ws://example.com:7000")?;
/// let registry = SocketRegistry::new(network.clone());
///
/// let a = registry.socket_for("ws://example.com:7000")?;
/// let b = registry.socket_for("ws://example.com:7000/")?;
/// assert_eq!(a, b);
/// assert_eq!(registry.len(), 1);
///
/// registry.close_socket_for("ws://example.com:7000");
/// assert!(registry.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct SocketRegistry {
    /// Socket factory.
    transport: Arc<dyn TransportFactory>,
    /// Tunables.
    options: RegistryOptions,
    /// Live connections (shared weakly with connection close hooks).
    sockets: Arc<RwLock<SocketMap>>,
}

impl fmt::Debug for SocketRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketRegistry")
            .field("options", &self.options)
            .field("sockets", &self.keys())
            .finish()
    }
}

// ============================================================================
// SocketRegistry - Constructor
// ============================================================================

impl SocketRegistry {
    /// Creates an empty registry with default options.
    #[must_use]
    pub fn new(transport: impl TransportFactory + 'static) -> Self {
        Self::with_options(transport, RegistryOptions::default())
    }

    /// Creates an empty registry with the given options.
    #[must_use]
    pub fn with_options(transport: impl TransportFactory + 'static, options: RegistryOptions) -> Self {
        Self::from_parts(Arc::new(transport), options)
    }

    /// Returns a builder for configuring a registry.
    #[inline]
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub(crate) fn from_parts(transport: Arc<dyn TransportFactory>, options: RegistryOptions) -> Self {
        debug!(?options, "SocketRegistry created");
        Self {
            transport,
            options,
            sockets: Arc::new(RwLock::new(SocketMap::default())),
        }
    }
}

// ============================================================================
// SocketRegistry - Public API
// ============================================================================

impl SocketRegistry {
    /// Returns the connection for `url_like`, creating it on a cache miss.
    ///
    /// Equivalent targets (same key) return the identical connection until
    /// it is closed. On a miss the transport receives `url_like` exactly as
    /// given; the connection is stored under its normalized key.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionCreation`](crate::Error::ConnectionCreation)
    /// if the transport cannot build a socket. The registry is unchanged.
    pub fn socket_for(&self, url_like: &str) -> Result<Connection> {
        let key = self.key_for(url_like);

        if let Some(existing) = self.sockets.read().get(&key) {
            trace!(key = %key, id = %existing.id(), "Connection cache hit");
            return Ok(existing.clone());
        }

        // Built without holding the map lock; the factory may call back in.
        let runtime = transport::runtime_handle(url_like)?;
        let parts = self
            .transport
            .create_socket(url_like)
            .map_err(|e| transport::creation_error(url_like, e))?;

        let connection = Connection::new(
            &runtime,
            key.clone(),
            url_like,
            parts,
            self.options.open_timeout,
            Some(self.close_hook()),
        );

        let existing = match self.sockets.write().entry(key) {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(connection.clone());
                None
            }
        };

        if let Some(existing) = existing {
            debug!(
                key = %existing.key(),
                id = %connection.id(),
                winner = %existing.id(),
                "Connection created concurrently, discarding"
            );
            connection.close();
            return Ok(existing);
        }

        info!(key = %connection.key(), id = %connection.id(), url = url_like, "Connection registered");
        Ok(connection)
    }

    /// Closes and forgets the connection for `url_like`.
    ///
    /// Returns `false` if nothing was registered under its key, which is not
    /// an error.
    pub fn close_socket_for(&self, url_like: &str) -> bool {
        let key = self.key_for(url_like);
        let removed = self.sockets.write().remove(&key);

        match removed {
            Some(connection) => {
                debug!(key = %key, id = %connection.id(), "Connection removed from registry");
                connection.close();
                true
            }
            None => {
                trace!(key = %key, "No connection to close");
                false
            }
        }
    }

    /// Closes and forgets every connection.
    pub fn close_all(&self) {
        let connections: Vec<_> = self.sockets.write().drain().collect();
        let count = connections.len();

        for (_, connection) in connections {
            connection.close();
        }

        info!(count, "All connections closed");
    }
}

// ============================================================================
// SocketRegistry - Introspection
// ============================================================================

impl SocketRegistry {
    /// Returns a snapshot of the key → connection map.
    #[must_use]
    pub fn sockets(&self) -> FxHashMap<ConnectionKey, Connection> {
        self.sockets.read().clone()
    }

    /// Returns the cached connection for `url_like`, without creating one.
    #[must_use]
    pub fn get(&self, url_like: &str) -> Option<Connection> {
        self.sockets.read().get(&self.key_for(url_like)).cloned()
    }

    /// Returns `true` if a connection is cached for `url_like`.
    #[must_use]
    pub fn contains(&self, url_like: &str) -> bool {
        self.sockets.read().contains_key(&self.key_for(url_like))
    }

    /// Returns the cached keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<ConnectionKey> {
        let mut keys: Vec<_> = self.sockets.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the number of cached connections.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sockets.read().len()
    }

    /// Returns `true` if no connection is cached.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sockets.read().is_empty()
    }

    /// Returns the key `url_like` is cached under.
    #[inline]
    #[must_use]
    pub fn key_for(&self, url_like: &str) -> ConnectionKey {
        self.options.key_policy.normalize(url_like)
    }

    /// Returns the registry options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }
}

// ============================================================================
// SocketRegistry - Close Hook
// ============================================================================

impl SocketRegistry {
    /// Hook that drops a connection's entry once its socket closes.
    ///
    /// Only the same instance is removed; a newer connection cached under
    /// the key after an explicit close stays.
    fn close_hook(&self) -> CloseHook {
        let sockets = Arc::downgrade(&self.sockets);

        Box::new(move |id, key| {
            let Some(sockets) = sockets.upgrade() else {
                return;
            };

            let mut sockets = sockets.write();
            if sockets.get(key).is_some_and(|c| c.id() == id) {
                sockets.remove(key);
                debug!(key = %key, id = %id, "Closed connection evicted from registry");
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
