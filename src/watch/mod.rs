//! Readiness watchers, heartbeat timer and their serialization context.
//!
//! # Ownership
//!
//! ```text
//!  Handler ──Arc──► Strand ◄──Weak── Watcher, HeartbeatTimer
//!     │                                  ▲
//!     ├──Arc──► Watcher (one per fd) ────┤ Weak self-reference
//!     └──Arc──► HeartbeatTimer ──────────┘ captured by callbacks
//! ```
//!
//! Callbacks queued on the reactor never hold a strong reference. They
//! re-validate the watcher or timer and then the strand before touching any
//! state.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `strand` | [`Strand`] serialization context |
//! | `watcher` | Per-descriptor readiness watcher |
//! | `heartbeat` | Drift-free periodic heartbeat timer |

// ============================================================================
// Submodules
// ============================================================================

/// Drift-free heartbeat timer.
pub(crate) mod heartbeat;

/// Serialization context.
pub mod strand;

/// Per-descriptor readiness watcher.
pub(crate) mod watcher;

// ============================================================================
// Re-exports
// ============================================================================

pub(crate) use heartbeat::HeartbeatTimer;
pub use strand::Strand;
pub(crate) use watcher::Watcher;
