//! Builder pattern for registry configuration.
//!
//! Provides a fluent API for configuring and creating [`SocketRegistry`]
//! instances.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use websocket_registry::{MockNetwork, SocketRegistry};
//!
//! # fn example() -> websocket_registry::Result<()> {
//! let registry = SocketRegistry::builder()
//!     .transport(MockNetwork::new())
//!     .open_timeout(Duration::from_secs(5))
//!     .build()?;
//! assert!(registry.is_empty());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::key::KeyPolicy;
use crate::transport::TransportFactory;

use super::core::SocketRegistry;
use super::options::RegistryOptions;

// ============================================================================
// RegistryBuilder
// ============================================================================

/// Builder for configuring a [`SocketRegistry`].
///
/// Use [`SocketRegistry::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct RegistryBuilder {
    /// Socket factory.
    transport: Option<Arc<dyn TransportFactory>>,
    /// Registry tunables.
    options: RegistryOptions,
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("transport", &self.transport.is_some())
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// RegistryBuilder Implementation
// ============================================================================

impl RegistryBuilder {
    /// Creates a new builder with no transport and default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transport factory sockets are built with.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: impl TransportFactory + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets an already shared transport factory.
    #[inline]
    #[must_use]
    pub fn shared_transport(mut self, transport: Arc<dyn TransportFactory>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the key policy.
    #[inline]
    #[must_use]
    pub fn key_policy(mut self, policy: KeyPolicy) -> Self {
        self.options.key_policy = policy;
        self
    }

    /// Sets how long `Connection::opened` waits.
    #[inline]
    #[must_use]
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.options.open_timeout = timeout;
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: RegistryOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the registry with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no transport was set
    /// - [`Error::Config`] if the open timeout is zero
    pub fn build(self) -> Result<SocketRegistry> {
        let transport = self.transport.ok_or_else(|| {
            Error::config(
                "Transport is required. Use .transport() to set it.\n\
                 Example: SocketRegistry::builder().transport(WebSocketTransport::new())",
            )
        })?;

        if self.options.open_timeout.is_zero() {
            return Err(Error::config("Open timeout must be greater than zero"));
        }

        Ok(SocketRegistry::from_parts(transport, self.options))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::MockNetwork;

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = RegistryBuilder::new();
        assert!(builder.transport.is_none());
        assert_eq!(builder.options, RegistryOptions::default());
    }

    #[test]
    fn test_build_without_transport_fails() {
        let err = RegistryBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("Transport is required"));
    }

    #[test]
    fn test_build_rejects_zero_timeout() {
        let result = RegistryBuilder::new()
            .transport(MockNetwork::new())
            .open_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_build_applies_options() {
        let registry = RegistryBuilder::new()
            .transport(MockNetwork::new())
            .key_policy(KeyPolicy::Verbatim)
            .open_timeout(Duration::from_secs(2))
            .build()
            .expect("build");

        assert_eq!(registry.options().key_policy, KeyPolicy::Verbatim);
        assert_eq!(registry.options().open_timeout, Duration::from_secs(2));
        assert!(registry.is_empty());
    }
}
