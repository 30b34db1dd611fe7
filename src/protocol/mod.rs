//! Protocol engine interface.
//!
//! This module defines what the adapter needs from the AMQP engine and the
//! readiness masks exchanged with it.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | [`Connection`] trait and handle aliases |
//! | `events` | [`Events`] masks and [`Direction`] |

// ============================================================================
// Submodules
// ============================================================================

/// Engine callbacks.
pub mod connection;

/// Readiness masks.
pub mod events;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ConnectionHandle};
pub(crate) use connection::ConnectionRef;
pub use events::{Direction, Events};
