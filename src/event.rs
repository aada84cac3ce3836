//! Socket event and payload types.
//!
//! Transports report what happens on the wire as [`SocketEvent`]s; the
//! connection re-emits each one to subscribers under its [`EventKind`].
//!
//! # Event Kinds
//!
//! | Kind | Event | Effect on state |
//! |------|-------|-----------------|
//! | `open` | [`SocketEvent::Open`] | `Connecting` → `Open` |
//! | `message` | [`SocketEvent::Message`] | none |
//! | `error` | [`SocketEvent::Error`] | none |
//! | `close` | [`SocketEvent::Close`] | any → `Closed` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code sent when an endpoint is going away (server shutdown).
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close code reported when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

// ============================================================================
// Payload
// ============================================================================

/// Raw message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Payload {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl Payload {
    /// Returns the text content, if this is a text payload.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Returns the raw bytes of either variant.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }

    /// Returns the payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns `true` if the payload carries no bytes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes `value` into a JSON text payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Text(serde_json::to_string(value)?))
    }

    /// Parses the payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the content is not
    /// valid JSON for `T`.
    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(self.as_bytes())?)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
    }
}

impl From<&[u8]> for Payload {
    fn from(data: &[u8]) -> Self {
        Self::Binary(data.to_vec())
    }
}

// ============================================================================
// CloseInfo
// ============================================================================

/// Details of a closed socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseInfo {
    /// Close code, if the peer sent one.
    pub code: Option<u16>,
    /// Close reason text.
    pub reason: String,
    /// `true` if the close handshake completed.
    pub was_clean: bool,
}

impl CloseInfo {
    /// Creates a clean close with the given code and reason.
    #[inline]
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
            was_clean: true,
        }
    }

    /// Normal closure (1000) with no reason.
    #[inline]
    #[must_use]
    pub fn normal() -> Self {
        Self::new(CLOSE_NORMAL, "")
    }

    /// Abnormal closure (1006): the socket went away without a handshake.
    #[inline]
    #[must_use]
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: Some(CLOSE_ABNORMAL),
            reason: reason.into(),
            was_clean: false,
        }
    }

    /// Clean close without a status code.
    #[inline]
    #[must_use]
    pub fn no_status() -> Self {
        Self {
            code: None,
            reason: String::new(),
            was_clean: true,
        }
    }
}

// ============================================================================
// EventKind
// ============================================================================

/// Name of a connection event, used as the emitter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Socket finished connecting.
    Open,
    /// Data arrived from the peer.
    Message,
    /// Transport reported a failure.
    Error,
    /// Socket closed.
    Close,
}

impl EventKind {
    /// All kinds, in lifecycle order.
    pub const ALL: [EventKind; 4] = [Self::Open, Self::Message, Self::Error, Self::Close];

    /// Returns the event name (`"open"`, `"message"`, `"error"`, `"close"`).
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Message => "message",
            Self::Error => "error",
            Self::Close => "close",
        }
    }

    /// Looks up a kind by event name. Unknown names yield `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SocketEvent
// ============================================================================

/// Event reported by a transport socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Socket is open.
    Open,
    /// Data frame from the peer, unaltered.
    Message(Payload),
    /// Transport failure description.
    Error(String),
    /// Socket closed.
    Close(CloseInfo),
}

impl SocketEvent {
    /// Returns the kind this event is emitted under.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
            Self::Close(_) => EventKind::Close,
        }
    }

    /// Returns the payload of a message event.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Message(payload) => Some(payload),
            _ => None,
        }
    }

    /// Returns the close details of a close event.
    #[inline]
    #[must_use]
    pub fn close_info(&self) -> Option<&CloseInfo> {
        match self {
            Self::Close(info) => Some(info),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_event_kind_names() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_name("bogus"), None);
        assert_eq!(EventKind::Message.to_string(), "message");
    }

    #[test]
    fn test_socket_event_kind() {
        assert_eq!(SocketEvent::Open.kind(), EventKind::Open);
        assert_eq!(SocketEvent::Message("x".into()).kind(), EventKind::Message);
        assert_eq!(SocketEvent::Error("e".into()).kind(), EventKind::Error);
        assert_eq!(
            SocketEvent::Close(CloseInfo::normal()).kind(),
            EventKind::Close
        );
    }

    #[test]
    fn test_payload_accessors() {
        let text = Payload::from("SampleData");
        assert_eq!(text.as_text(), Some("SampleData"));
        assert_eq!(text.len(), 10);

        let binary = Payload::from(vec![1u8, 2, 3]);
        assert_eq!(binary.as_text(), None);
        assert_eq!(binary.as_bytes(), &[1, 2, 3]);
        assert!(!binary.is_empty());
        assert!(Payload::from("").is_empty());
    }

    #[test]
    fn test_payload_json() {
        let payload = Payload::json(&json!({"op": "ping", "seq": 4})).expect("serialize");
        let value: serde_json::Value = payload.parse_json().expect("parse");
        assert_eq!(value["op"], "ping");
        assert_eq!(value["seq"], 4);

        assert!(Payload::from("not json").parse_json::<serde_json::Value>().is_err());
    }

    #[test]
    fn test_close_info_constructors() {
        assert_eq!(CloseInfo::normal().code, Some(CLOSE_NORMAL));
        assert!(CloseInfo::normal().was_clean);

        let abnormal = CloseInfo::abnormal("reset");
        assert_eq!(abnormal.code, Some(CLOSE_ABNORMAL));
        assert!(!abnormal.was_clean);
        assert_eq!(abnormal.reason, "reset");

        assert_eq!(CloseInfo::no_status().code, None);
    }
}
