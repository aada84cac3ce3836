//! Connection lifecycle state.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a [`Connection`](crate::Connection).
///
/// ```text
/// Connecting ──open──► Open ──close()──► Closing ──close──► Closed
///     │                  │                                   ▲
///     └──close()─► Closing          └───────transport close──┘
/// ```
///
/// Only transport events move a connection into `Open` or `Closed`;
/// an explicit `close()` moves it into `Closing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Socket is being established.
    #[default]
    Connecting,
    /// Socket is open and ready for data transfer.
    Open,
    /// Close requested, waiting for the transport to confirm.
    Closing,
    /// Socket is closed. Terminal.
    Closed,
}

impl ConnectionState {
    /// Returns `true` for every state except `Closed`.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    /// Returns `true` only for `Open`.
    #[inline]
    #[must_use]
    pub const fn can_send(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` once a close was requested or observed.
    #[inline]
    #[must_use]
    pub const fn is_closing_or_closed(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        assert_eq!(ConnectionState::default(), ConnectionState::Connecting);
    }

    #[test]
    fn test_can_send_in_each_state() {
        assert!(!ConnectionState::Connecting.can_send());
        assert!(ConnectionState::Open.can_send());
        assert!(!ConnectionState::Closing.can_send());
        assert!(!ConnectionState::Closed.can_send());
    }

    #[test]
    fn test_is_active() {
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Open.is_active());
        assert!(ConnectionState::Closing.is_active());
        assert!(!ConnectionState::Closed.is_active());
    }

    #[test]
    fn test_is_closing_or_closed() {
        assert!(!ConnectionState::Connecting.is_closing_or_closed());
        assert!(!ConnectionState::Open.is_closing_or_closed());
        assert!(ConnectionState::Closing.is_closing_or_closed());
        assert!(ConnectionState::Closed.is_closing_or_closed());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "Connecting");
        assert_eq!(ConnectionState::Closed.to_string(), "Closed");
    }
}
