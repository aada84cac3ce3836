//! Connection registry module.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SocketRegistry`] | Get-or-create cache of connections by key |
//! | [`RegistryBuilder`] | Fluent configuration builder |
//! | [`RegistryOptions`] | Key policy and open timeout |
//!
//! # Example
//!
//! ```
//! use websocket_registry::{MockNetwork, SocketRegistry, WebSocketTransport};
//!
//! # fn example() -> websocket_registry::Result<()> {
//! // Production wiring
//! let live = SocketRegistry::new(WebSocketTransport::new());
//!
//! // Test wiring
//! let network = MockNetwork::new();
//! let mocked = SocketRegistry::builder().transport(network).build()?;
//!
//! assert!(live.is_empty() && mocked.is_empty());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for registry configuration.
pub mod builder;

/// Core registry implementation.
pub mod core;

/// Registry options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::RegistryBuilder;
pub use core::SocketRegistry;
pub use options::{DEFAULT_OPEN_TIMEOUT, RegistryOptions};
