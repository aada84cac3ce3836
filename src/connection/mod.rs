//! Registry-managed connections.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Connection`] | Handle to one socket plus its event subscribers |
//! | [`ConnectionState`] | Lifecycle state |
//! | [`EventHandler`] | Shared handler for connection events |

// ============================================================================
// Submodules
// ============================================================================

/// Connection handle and event loop.
mod core;

/// Connection lifecycle state.
mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub(crate) use core::CloseHook;
pub use core::{Connection, EventHandler};
pub use state::ConnectionState;
