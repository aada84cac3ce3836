//! WebSocket registry - client-side connection cache with event dispatch.
//!
//! This library keeps at most one live WebSocket connection per target URL
//! and lets any number of subscribers observe each connection's `open`,
//! `message`, `error` and `close` events.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐ socket_for(url) ┌──────────────────┐
//! │ SocketRegistry │ ──────────────► │ TransportFactory │
//! └───────┬────────┘                 └────────┬─────────┘
//!         │ key → Connection                  │ Socket + events
//!         ▼                                   ▼
//! ┌────────────────┐   SocketEvent   ┌──────────────────┐
//! │   Connection   │ ◄────────────── │  WebSocket/Mock  │
//! │  EventEmitter  │                 └──────────────────┘
//! └────────────────┘
//! ```
//!
//! Key design principles:
//!
//! - The registry is an explicit value owned by the caller, not a global
//! - Targets are normalized to a [`ConnectionKey`] before lookup
//! - A connection that closes (either side) leaves the registry
//! - Transport events are dispatched from a Tokio task per connection
//!
//! # Quick Start
//!
//! ```no_run
//! use websocket_registry::{EventKind, Result, SocketEvent, SocketRegistry, WebSocketTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let registry = SocketRegistry::new(WebSocketTransport::new());
//!
//!     let socket = registry.socket_for("ws://127.0.0.1:9001")?;
//!     socket.on_fn(EventKind::Message, |event: &SocketEvent| {
//!         println!("message: {:?}", event.payload());
//!     });
//!
//!     socket.opened().await?;
//!     socket.send_text("hello")?;
//!
//!     registry.close_socket_for("ws://127.0.0.1:9001");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`registry`] | [`SocketRegistry`], its builder and options |
//! | [`connection`] | [`Connection`] handle and lifecycle state |
//! | [`emitter`] | Generic [`EventEmitter`] |
//! | [`event`] | [`SocketEvent`], [`Payload`], [`CloseInfo`] |
//! | [`key`] | [`ConnectionKey`] and [`KeyPolicy`] |
//! | [`transport`] | Transport seam, WebSocket client and in-process mock |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |

// ============================================================================
// Modules
// ============================================================================

/// Registry-managed connections.
///
/// - [`Connection`] - Handle to one socket and its subscribers
/// - [`ConnectionState`] - Lifecycle state
pub mod connection;

/// Generic keyed event emitter.
pub mod emitter;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Socket events and payloads.
pub mod event;

/// Type-safe identifiers for connections and listeners.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Connection keys and normalization policy.
pub mod key;

/// Connection registry.
///
/// Use [`SocketRegistry::new()`] or [`SocketRegistry::builder()`].
pub mod registry;

/// Transport layer.
///
/// Defines the [`TransportFactory`] seam plus the WebSocket and mock
/// implementations.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Connection types
pub use connection::{Connection, ConnectionState, EventHandler};

// Emitter types
pub use emitter::{EventEmitter, Handler};

// Error types
pub use error::{Error, Result};

// Event types
pub use event::{CloseInfo, EventKind, Payload, SocketEvent};

// Identifier types
pub use identifiers::{ConnectionId, ListenerId};

// Key types
pub use key::{ConnectionKey, KeyPolicy};

// Registry types
pub use registry::{RegistryBuilder, RegistryOptions, SocketRegistry};

// Transport types
pub use transport::{
    MockNetwork, MockPeer, MockServer, Socket, SocketParts, TransportFactory, WebSocketTransport,
};
