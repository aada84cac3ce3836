//! In-process mock WebSocket servers.
//!
//! A [`MockNetwork`] is a [`TransportFactory`] whose sockets connect to
//! [`MockServer`]s bound on the same network instead of the wire. It
//! behaves like a browser socket talking to a live endpoint:
//!
//! - Socket to a bound URL: `open`, then the server's connection handlers run
//! - Socket to an unbound URL: `error`, then `close` (1006)
//! - [`MockServer::stop`]: every peer receives `close` (1001)
//!
//! URLs are matched by their canonical [`ConnectionKey`], so
//! `ws://example.com:7000` and `ws://example.com:7000/` reach the same server.
//!
//! Everything is delivered from a spawned task, never from inside
//! `create_socket`, so handlers registered before the caller yields see
//! every event.
//!
//! # Example
//!
//! ```
//! use websocket_registry::{MockNetwork, SocketRegistry};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> websocket_registry::Result<()> {
//! let network = MockNetwork::new();
//! let server = network.bind("ws://example.com:7000")?;
//! server.on_connection(|peer| {
//!     peer.send("welcome");
//! });
//!
//! let registry = SocketRegistry::new(network.clone());
//! let socket = registry.socket_for("ws://example.com:7000")?;
//! socket.opened().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::event::{CLOSE_GOING_AWAY, CloseInfo, Payload, SocketEvent};
use crate::key::ConnectionKey;

use super::{EventSender, Socket, SocketParts, TransportFactory};

// ============================================================================
// Types
// ============================================================================

/// Callback run for every socket that connects to a server.
type ConnectionHandler = Arc<dyn Fn(&MockPeer) + Send + Sync>;

/// Callback run for every payload a connected socket sends.
type MessageHandler = Arc<dyn Fn(&MockPeer, &Payload) + Send + Sync>;

/// Bound servers by canonical key.
type ServerMap = FxHashMap<ConnectionKey, Arc<ServerShared>>;

// ============================================================================
// MockNetwork
// ============================================================================

/// A set of mock servers addressable by URL.
///
/// Cloning yields another handle to the same network.
#[derive(Clone, Default)]
pub struct MockNetwork {
    servers: Arc<RwLock<ServerMap>>,
}

impl fmt::Debug for MockNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockNetwork")
            .field("servers", &self.servers.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MockNetwork {
    /// Creates an empty network.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a server to `url`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if `url` is not a `ws`/`wss` URL
    /// - [`Error::Config`] if a server is already bound there
    pub fn bind(&self, url: &str) -> Result<MockServer> {
        super::validate_ws_url(url)?;
        let key = ConnectionKey::new(url);

        let mut servers = self.servers.write();
        if servers.contains_key(&key) {
            return Err(Error::config(format!("Mock server already bound to {key}")));
        }

        let shared = Arc::new(ServerShared {
            key: key.clone(),
            peers: Mutex::new(Vec::new()),
            connection_handlers: Mutex::new(Vec::new()),
            message_handlers: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        });
        servers.insert(key.clone(), Arc::clone(&shared));

        info!(key = %key, "Mock server bound");

        Ok(MockServer {
            shared,
            servers: Arc::downgrade(&self.servers),
        })
    }

    /// Returns the number of bound servers.
    #[inline]
    #[must_use]
    pub fn server_count(&self) -> usize {
        self.servers.read().len()
    }

    fn lookup(&self, url: &str) -> Option<Arc<ServerShared>> {
        self.servers.read().get(&ConnectionKey::new(url)).cloned()
    }
}

impl TransportFactory for MockNetwork {
    fn create_socket(&self, url: &str) -> Result<SocketParts> {
        super::validate_ws_url(url).map_err(|e| super::creation_error(url, e))?;
        let runtime = super::runtime_handle(url)?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let peer = MockPeer::new(event_tx);
        let server = self.lookup(url);

        let socket = MockSocket {
            peer: peer.clone(),
            server: server.as_ref().map(Arc::downgrade),
        };

        let target = url.to_owned();
        runtime.spawn(async move {
            let accepted = server.is_some_and(|server| server.accept(&peer));
            if !accepted {
                debug!(url = %target, "No mock server bound, refusing connection");
                peer.error("connection refused");
                peer.close_with(CloseInfo::abnormal("connection refused"));
            }
        });

        Ok(SocketParts {
            socket: Box::new(socket),
            events: event_rx,
        })
    }
}

// ============================================================================
// ServerShared
// ============================================================================

/// State shared by a server handle, its network entry and its sockets.
struct ServerShared {
    key: ConnectionKey,
    peers: Mutex<Vec<MockPeer>>,
    connection_handlers: Mutex<Vec<ConnectionHandler>>,
    message_handlers: Mutex<Vec<MessageHandler>>,
    received: Mutex<Vec<Payload>>,
    stopped: AtomicBool,
}

impl ServerShared {
    /// Opens `peer` and hands it to the connection handlers.
    ///
    /// Returns `false` if the server is stopped. A peer the client already
    /// closed is skipped without a refusal.
    fn accept(&self, peer: &MockPeer) -> bool {
        {
            // Open and membership change together, so a concurrent detach or
            // stop sees either both or neither.
            let mut peers = self.peers.lock();
            if self.stopped.load(Ordering::SeqCst) {
                return false;
            }
            if !peer.push(SocketEvent::Open) {
                trace!(key = %self.key, "Peer closed before accept");
                return true;
            }
            peers.push(peer.clone());
        }

        debug!(key = %self.key, "Mock server accepted connection");

        let handlers: Vec<_> = self.connection_handlers.lock().clone();
        for handler in &handlers {
            handler(peer);
        }
        true
    }

    /// Records a payload sent by `peer` and runs the message handlers.
    fn deliver(&self, peer: &MockPeer, payload: Payload) {
        trace!(key = %self.key, len = payload.len(), "Mock server received payload");

        let handlers: Vec<_> = self.message_handlers.lock().clone();
        for handler in &handlers {
            handler(peer, &payload);
        }

        self.received.lock().push(payload);
    }

    fn detach(&self, peer: &MockPeer) {
        self.peers.lock().retain(|p| !p.same_as(peer));
    }
}

// ============================================================================
// MockServer
// ============================================================================

/// A mock endpoint bound to one URL on a [`MockNetwork`].
pub struct MockServer {
    shared: Arc<ServerShared>,
    servers: Weak<RwLock<ServerMap>>,
}

impl fmt::Debug for MockServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockServer")
            .field("key", &self.shared.key)
            .field("peers", &self.connection_count())
            .finish()
    }
}

impl MockServer {
    /// Returns the key this server is bound under.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &ConnectionKey {
        &self.shared.key
    }

    /// Runs `handler` for every socket that connects from now on.
    pub fn on_connection<F>(&self, handler: F)
    where
        F: Fn(&MockPeer) + Send + Sync + 'static,
    {
        self.shared.connection_handlers.lock().push(Arc::new(handler));
    }

    /// Runs `handler` for every payload a connected socket sends.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&MockPeer, &Payload) + Send + Sync + 'static,
    {
        self.shared.message_handlers.lock().push(Arc::new(handler));
    }

    /// Sends `payload` to every connected peer. Returns how many got it.
    pub fn send(&self, payload: impl Into<Payload>) -> usize {
        let payload = payload.into();
        self.peers()
            .iter()
            .filter(|peer| peer.send(payload.clone()))
            .count()
    }

    /// Reports a transport error to every connected peer.
    pub fn error(&self, message: &str) {
        for peer in self.peers() {
            peer.error(message);
        }
    }

    /// Returns the currently connected peers.
    #[must_use]
    pub fn peers(&self) -> Vec<MockPeer> {
        self.shared.peers.lock().clone()
    }

    /// Returns the number of connected peers.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.shared.peers.lock().len()
    }

    /// Returns every payload received so far, oldest first.
    #[must_use]
    pub fn received(&self) -> Vec<Payload> {
        self.shared.received.lock().clone()
    }

    /// Unbinds the server and closes every peer with 1001.
    ///
    /// Idempotent.
    pub fn stop(&self) {
        let peers: Vec<_> = {
            let mut peers = self.shared.peers.lock();
            if self.shared.stopped.swap(true, Ordering::SeqCst) {
                return;
            }
            peers.drain(..).collect()
        };

        if let Some(servers) = self.servers.upgrade() {
            servers.write().remove(&self.shared.key);
        }

        for peer in &peers {
            peer.close_with(CloseInfo::new(CLOSE_GOING_AWAY, "server stopped"));
        }

        info!(key = %self.shared.key, peers = peers.len(), "Mock server stopped");
    }
}

// ============================================================================
// MockPeer
// ============================================================================

/// Server-side view of one connected socket.
#[derive(Clone)]
pub struct MockPeer {
    inner: Arc<PeerInner>,
}

struct PeerInner {
    events: EventSender,
    closed: AtomicBool,
}

impl fmt::Debug for MockPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockPeer")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl MockPeer {
    fn new(events: EventSender) -> Self {
        Self {
            inner: Arc::new(PeerInner {
                events,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Pushes `event` unless the peer is closed.
    fn push(&self, event: SocketEvent) -> bool {
        !self.is_closed() && self.inner.events.send(event).is_ok()
    }

    fn same_as(&self, other: &MockPeer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Sends `payload` to the client socket. Returns `false` once closed.
    pub fn send(&self, payload: impl Into<Payload>) -> bool {
        self.push(SocketEvent::Message(payload.into()))
    }

    /// Reports a transport error to the client socket.
    pub fn error(&self, message: &str) -> bool {
        self.push(SocketEvent::Error(message.to_owned()))
    }

    /// Closes the socket from the server side.
    pub fn close(&self, code: u16, reason: &str) {
        self.close_with(CloseInfo::new(code, reason));
    }

    /// Drops the socket without a close handshake (1006).
    pub fn terminate(&self) {
        self.close_with(CloseInfo::abnormal("terminated"));
    }

    fn close_with(&self, info: CloseInfo) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.events.send(SocketEvent::Close(info));
    }

    /// Returns `true` once either side closed the socket.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// MockSocket
// ============================================================================

/// Client end handed to the connection.
struct MockSocket {
    peer: MockPeer,
    server: Option<Weak<ServerShared>>,
}

impl MockSocket {
    fn server(&self) -> Option<Arc<ServerShared>> {
        self.server.as_ref().and_then(Weak::upgrade)
    }
}

impl Socket for MockSocket {
    fn send(&self, payload: Payload) -> Result<()> {
        if self.peer.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        match self.server() {
            Some(server) if !server.stopped.load(Ordering::SeqCst) => {
                server.deliver(&self.peer, payload);
                Ok(())
            }
            _ => Err(Error::ConnectionClosed),
        }
    }

    fn close(&self) {
        // Closed first, so a racing accept cannot record the peer afterwards.
        self.peer.close_with(CloseInfo::normal());
        if let Some(server) = self.server() {
            server.detach(&self.peer);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
