//! Transport seam between connections and the wire.
//!
//! A [`TransportFactory`] turns a URL into a [`Socket`] plus the channel its
//! [`SocketEvent`]s arrive on. Connections never talk to the network
//! directly; they only consume events and call `send`/`close`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  create_socket(url)  ┌──────────────────┐
//! │   Registry   │ ───────────────────► │ TransportFactory │
//! └──────┬───────┘                      └────────┬─────────┘
//!        │ wraps                                  │ builds
//!        ▼                                        ▼
//! ┌──────────────┐   send / close       ┌──────────────────┐
//! │  Connection  │ ───────────────────► │      Socket      │
//! │  (emitter)   │ ◄─────────────────── │                  │
//! └──────────────┘   SocketEvent (mpsc) └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | Real client over `tokio-tungstenite` |
//! | `mock` | In-process server/socket pairs for tests |

// ============================================================================
// Submodules
// ============================================================================

/// In-process mock server and sockets.
pub mod mock;

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc;
use url::Url;

use crate::error::{Error, Result};
use crate::event::{Payload, SocketEvent};

// ============================================================================
// Re-exports
// ============================================================================

pub use mock::{MockNetwork, MockPeer, MockServer};
pub use websocket::WebSocketTransport;

// ============================================================================
// Types
// ============================================================================

/// Receiving end of a socket's event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<SocketEvent>;

/// Sending end of a socket's event stream, held by the transport.
pub type EventSender = mpsc::UnboundedSender<SocketEvent>;

// ============================================================================
// Socket
// ============================================================================

/// Capabilities of one transport socket.
///
/// Lifecycle and data are reported asynchronously through the
/// [`EventReceiver`] returned alongside the socket, never through return
/// values.
pub trait Socket: Send + Sync {
    /// Queues `payload` for delivery to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the socket can no longer send.
    fn send(&self, payload: Payload) -> Result<()>;

    /// Starts closing the socket.
    ///
    /// Completion is reported as a [`SocketEvent::Close`]. Calling this more
    /// than once has no further effect.
    fn close(&self);
}

/// A freshly created socket and its event stream.
pub struct SocketParts {
    /// The socket itself.
    pub socket: Box<dyn Socket>,
    /// Events for this socket, in the order the transport observed them.
    pub events: EventReceiver,
}

// ============================================================================
// TransportFactory
// ============================================================================

/// Builds sockets for connection targets.
pub trait TransportFactory: Send + Sync {
    /// Creates a socket for `url`, as given by the caller (not normalized).
    ///
    /// Must not block. Connecting happens in the background and is reported
    /// through the returned event stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionCreation`] if no socket can be built for
    /// `url` at all (malformed target, no runtime).
    fn create_socket(&self, url: &str) -> Result<SocketParts>;
}

// ============================================================================
// Helpers
// ============================================================================

/// Parses `url` and checks it names a `ws`/`wss` endpoint with a host.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] otherwise.
pub fn validate_ws_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim()).map_err(|e| Error::invalid_url(url, e.to_string()))?;

    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(Error::invalid_url(
            url,
            format!("unsupported scheme '{}'", parsed.scheme()),
        ));
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::invalid_url(url, "missing host"));
    }

    Ok(parsed)
}

/// Wraps any failure from socket construction as a creation error.
pub(crate) fn creation_error(url: &str, err: Error) -> Error {
    match err {
        Error::ConnectionCreation { .. } => err,
        other => Error::connection_creation(url, other.to_string()),
    }
}

/// Returns the current Tokio runtime handle, or a creation error.
pub(crate) fn runtime_handle(url: &str) -> Result<tokio::runtime::Handle> {
    tokio::runtime::Handle::try_current()
        .map_err(|e| Error::connection_creation(url, format!("no Tokio runtime: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
