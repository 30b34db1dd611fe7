//! Handler facade for the protocol engine.
//!
//! This module provides the entry point an AMQP engine calls into.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Handler`] | Descriptor registry and heartbeat owner |
//! | [`HandlerBuilder`] | Fluent configuration builder |
//! | [`ReactorOptions`] | Descriptor registration options |
//!
//! # Example
//!
//! ```no_run
//! use amqp_reactor::{Handler, Result};
//!
//! # async fn example() -> Result<()> {
//! let handler = Handler::builder().nonblocking(true).build()?;
//! assert_eq!(handler.watcher_count(), 0);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for handler configuration.
pub mod builder;

/// Core handler implementation.
pub mod core;

/// Descriptor registration options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::HandlerBuilder;
pub use core::Handler;
pub use options::ReactorOptions;
