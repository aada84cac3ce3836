//! Error types for the WebSocket registry.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use websocket_registry::{Result, SocketRegistry};
//!
//! fn example(registry: &SocketRegistry) -> Result<()> {
//!     let socket = registry.socket_for("ws://example.com:7000")?;
//!     socket.send_text("hello")?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidUrl`] |
//! | Connection | [`Error::ConnectionCreation`], [`Error::ConnectionClosed`], [`Error::ConnectionTimeout`] |
//! | State | [`Error::NotOpen`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |
//!
//! Transport-level failures that happen after a socket exists are never
//! returned from here; they are emitted as `error` events on the connection.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::connection::ConnectionState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when registry configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Connection target is not a usable WebSocket URL.
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The rejected target.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport factory failed to build a socket.
    ///
    /// Returned by `socket_for`; the registry is left unchanged.
    #[error("Failed to create connection to {url}: {message}")]
    ConnectionCreation {
        /// Target the connection was requested for.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// Connection closed before the awaited operation completed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Timed out waiting for the connection to open.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // State Errors
    // ========================================================================
    /// Send attempted while the connection is not open.
    ///
    /// The connection itself is unaffected.
    #[error("Connection is not open (state: {state})")]
    NotOpen {
        /// State the connection was in at the time of the call.
        state: ConnectionState,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid URL error.
    #[inline]
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a connection creation error.
    #[inline]
    pub fn connection_creation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionCreation {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a not-open error.
    #[inline]
    pub fn not_open(state: ConnectionState) -> Self {
        Self::NotOpen { state }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionCreation { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if retrying the call later may succeed.
    ///
    /// A `NotOpen` connection may still open; a timeout may be transient.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::NotOpen { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection_creation("ws://x", "refused");
        assert_eq!(
            err.to_string(),
            "Failed to create connection to ws://x: refused"
        );
    }

    #[test]
    fn test_not_open_display() {
        let err = Error::not_open(ConnectionState::Connecting);
        assert_eq!(
            err.to_string(),
            "Connection is not open (state: Connecting)"
        );
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::connection_timeout(5000);
        let other_err = Error::ConnectionClosed;

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection_creation("ws://x", "boom").is_connection_error());
        assert!(Error::connection_timeout(1000).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
        assert!(!Error::not_open(ConnectionState::Closed).is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::not_open(ConnectionState::Connecting).is_recoverable());
        assert!(!Error::config("test").is_recoverable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
