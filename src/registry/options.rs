//! Registry configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use websocket_registry::{KeyPolicy, RegistryOptions};
//!
//! let options = RegistryOptions::new()
//!     .with_key_policy(KeyPolicy::Verbatim)
//!     .with_open_timeout(Duration::from_secs(5));
//!
//! assert_eq!(options.key_policy, KeyPolicy::Verbatim);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::key::KeyPolicy;

// ============================================================================
// Constants
// ============================================================================

/// Default upper bound for `Connection::opened`.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// RegistryOptions
// ============================================================================

/// Tunables for a [`SocketRegistry`](crate::SocketRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// How targets are turned into cache keys.
    pub key_policy: KeyPolicy,

    /// How long `Connection::opened` waits before giving up.
    pub open_timeout: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RegistryOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            key_policy: KeyPolicy::Canonical,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RegistryOptions {
    /// Sets the key policy.
    #[inline]
    #[must_use]
    pub const fn with_key_policy(mut self, policy: KeyPolicy) -> Self {
        self.key_policy = policy;
        self
    }

    /// Sets the open timeout.
    #[inline]
    #[must_use]
    pub const fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
