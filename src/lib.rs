//! AMQP reactor adapter - Drive a descriptor-based AMQP engine from tokio.
//!
//! This library connects an AMQP protocol engine that performs its own socket
//! I/O to an asynchronous reactor. The engine says which descriptors it wants
//! to hear about; the adapter waits for readiness and calls the engine back.
//! It also runs the negotiated heartbeat timer.
//!
//! # Architecture
//!
//! The adapter never reads or writes payload bytes:
//!
//! - **Engine (caller)**: Owns descriptors, performs I/O, implements [`Connection`]
//! - **Adapter (this crate)**: Arms readiness waits and the heartbeat timer
//!
//! Key design principles:
//!
//! - At most one readiness wait outstanding per descriptor and direction
//! - All callbacks serialized by a per-handler [`Strand`]
//! - Callbacks hold only weak references, so teardown is always safe
//! - Heartbeats rescheduled from the previous deadline (no drift)
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use amqp_reactor::{Connection, ConnectionHandle, Events, Handler, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let connection: ConnectionHandle = Arc::new(MyEngine::connect()?);
//!     let mut handler = Handler::builder().build()?;
//!
//!     // Engine asks for readability on its socket
//!     handler.monitor(&connection, connection.fd(), Events::READABLE)?;
//!
//!     // Engine negotiated a 60 second heartbeat
//!     handler.on_negotiate(&connection, 60);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`handler`] | [`Handler`] facade and configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | [`Connection`] trait and [`Events`] masks |
//! | [`reactor`] | [`Reactor`] abstraction and tokio backend |
//! | [`watch`] | Watchers, heartbeat timer and [`Strand`] |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Handler facade and configuration.
///
/// Use [`Handler::builder()`] to create a configured handler.
pub mod handler;

/// Engine interface types.
pub mod protocol;

/// Reactor abstraction and the tokio backend.
pub mod reactor;

/// Readiness watchers, heartbeat timer and serialization.
pub mod watch;

// ============================================================================
// Re-exports
// ============================================================================

// Handler types
pub use handler::{Handler, HandlerBuilder, ReactorOptions};

// Engine types
pub use protocol::{Connection, ConnectionHandle, Direction, Events};

// Reactor types
pub use reactor::{DeadlineTimer, Reactor, Registration, TokioReactor, WaitCallback};

// Serialization
pub use watch::Strand;

// Error types
pub use error::{CompletionKind, Error, Result};
