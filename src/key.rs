//! Connection key normalization.
//!
//! Turns a URL-like connection target into the [`ConnectionKey`] the
//! registry caches under. Normalization is pure and total: every input,
//! including malformed ones, yields a key.
//!
//! # Policies
//!
//! | Policy | Behaviour |
//! |--------|-----------|
//! | [`KeyPolicy::Canonical`] | Parse as a URL, lowercase scheme/host, drop default port, userinfo, fragment and trailing slashes |
//! | [`KeyPolicy::Verbatim`] | Trimmed input is the key |
//!
//! # Example
//!
//! ```
//! use websocket_registry::{ConnectionKey, KeyPolicy};
//!
//! let a = ConnectionKey::new("ws://Example.com:7000/");
//! let b = ConnectionKey::new("ws://example.com:7000");
//! assert_eq!(a, b);
//! assert_eq!(a.as_str(), "ws://example.com:7000");
//!
//! let raw = KeyPolicy::Verbatim.normalize(" ws://example.com:7000/ ");
//! assert_eq!(raw.as_str(), "ws://example.com:7000/");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Borrow;
use std::fmt;

use url::Url;

// ============================================================================
// ConnectionKey
// ============================================================================

/// Normalized registry key for a connection target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey(String);

impl ConnectionKey {
    /// Normalizes `url_like` with the default [`KeyPolicy`].
    #[inline]
    #[must_use]
    pub fn new(url_like: &str) -> Self {
        KeyPolicy::default().normalize(url_like)
    }

    /// Returns the key as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key, returning the inner string.
    #[inline]
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConnectionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ConnectionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// KeyPolicy
// ============================================================================

/// Rule set used to derive a [`ConnectionKey`] from a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyPolicy {
    /// WHATWG URL canonical form without trailing slashes.
    ///
    /// Falls back to the trimmed input when it does not parse as a URL.
    #[default]
    Canonical,

    /// Trimmed input, otherwise untouched.
    Verbatim,
}

impl KeyPolicy {
    /// Normalizes `url_like` into a key under this policy.
    #[must_use]
    pub fn normalize(&self, url_like: &str) -> ConnectionKey {
        let trimmed = url_like.trim();
        let key = match self {
            Self::Canonical => canonicalize(trimmed),
            Self::Verbatim => trimmed.to_owned(),
        };
        ConnectionKey(key)
    }
}

/// Canonical form of an already trimmed target.
fn canonicalize(target: &str) -> String {
    let Ok(mut url) = Url::parse(target) else {
        return target.to_owned();
    };

    url.set_fragment(None);

    // Opaque URLs (no authority) have nothing else to collapse.
    let Some(host) = url.host_str() else {
        return url.as_str().to_owned();
    };

    let mut key = format!("{}://{}", url.scheme(), host);

    // `port()` is already `None` for the scheme default.
    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }

    key.push_str(url.path().trim_end_matches('/'));

    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }

    key
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_canonical_keeps_scheme_and_host_dots() {
        let key = ConnectionKey::new("ws://example.com:7000");
        assert_eq!(key.as_str(), "ws://example.com:7000");
    }

    #[test]
    fn test_canonical_collapses_trailing_slash() {
        assert_eq!(
            ConnectionKey::new("ws://example.com:7000/"),
            ConnectionKey::new("ws://example.com:7000")
        );
        assert_eq!(
            ConnectionKey::new("ws://example.com/chat/").as_str(),
            "ws://example.com/chat"
        );
    }

    #[test]
    fn test_canonical_lowercases_scheme_and_host() {
        let key = ConnectionKey::new("WS://Example.COM:7000/Room");
        assert_eq!(key.as_str(), "ws://example.com:7000/Room");
    }

    #[test]
    fn test_canonical_drops_default_port() {
        assert_eq!(ConnectionKey::new("ws://example.com:80").as_str(), "ws://example.com");
        assert_eq!(
            ConnectionKey::new("wss://example.com:443/feed").as_str(),
            "wss://example.com/feed"
        );
        assert_eq!(
            ConnectionKey::new("wss://example.com:80").as_str(),
            "wss://example.com:80"
        );
    }

    #[test]
    fn test_canonical_drops_fragment_and_userinfo() {
        let key = ConnectionKey::new("ws://user:secret@example.com:7000/a?x=1#frag");
        assert_eq!(key.as_str(), "ws://example.com:7000/a?x=1");
    }

    #[test]
    fn test_distinct_ports_stay_distinct() {
        assert_ne!(
            ConnectionKey::new("ws://example.com:7000"),
            ConnectionKey::new("ws://example.com:7001")
        );
    }

    #[test]
    fn test_malformed_input_still_yields_key() {
        assert_eq!(ConnectionKey::new("  not a url  ").as_str(), "not a url");
        assert_eq!(ConnectionKey::new("").as_str(), "");
    }

    #[test]
    fn test_verbatim_only_trims() {
        let key = KeyPolicy::Verbatim.normalize("\tWS://Example.com:7000/ ");
        assert_eq!(key.as_str(), "WS://Example.com:7000/");
    }

    #[test]
    fn test_key_borrows_as_str() {
        let key = ConnectionKey::new("ws://a.b");
        let borrowed: &str = key.borrow();
        assert_eq!(borrowed, "ws://a.b");
        assert_eq!(key.to_string(), "ws://a.b");
    }

    fn ws_url() -> impl Strategy<Value = String> {
        (
            prop_oneof![Just("ws"), Just("wss"), Just("WS")],
            "[a-z]{1,10}(\\.[a-z]{2,5})?",
            proptest::option::of(1u16..=65535),
            "(/[a-z0-9]{1,6}){0,3}",
            any::<bool>(),
        )
            .prop_map(|(scheme, host, port, path, slash)| {
                let port = port.map(|p| format!(":{p}")).unwrap_or_default();
                let slash = if slash { "/" } else { "" };
                format!("{scheme}://{host}{port}{path}{slash}")
            })
    }

    proptest! {
        #[test]
        fn prop_normalize_is_total(input in ".*") {
            let _ = ConnectionKey::new(&input);
            let _ = KeyPolicy::Verbatim.normalize(&input);
        }

        #[test]
        fn prop_canonical_is_idempotent(url in ws_url()) {
            let once = ConnectionKey::new(&url);
            let twice = ConnectionKey::new(once.as_str());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_trailing_slash_is_irrelevant(url in ws_url()) {
            let with_slash = format!("{}/", url.trim_end_matches('/'));
            let without_slash = url.trim_end_matches('/').to_owned();
            prop_assert_eq!(
                ConnectionKey::new(&with_slash),
                ConnectionKey::new(&without_slash)
            );
        }

        #[test]
        fn prop_host_case_is_irrelevant(host in "[a-z]{1,10}\\.[a-z]{2,5}", port in 1u16..=65535) {
            let lower = format!("ws://{host}:{port}");
            let upper = format!("WS://{}:{port}", host.to_uppercase());
            prop_assert_eq!(ConnectionKey::new(&upper), ConnectionKey::new(&lower));
        }
    }
}
