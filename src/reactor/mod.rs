//! Reactor abstraction.
//!
//! The adapter never blocks and never touches payload bytes. It needs three
//! things from the event loop it runs on:
//!
//! - per-descriptor readiness waits ([`Registration`])
//! - cancellable deadline timers ([`DeadlineTimer`])
//! - a way to create both ([`Reactor`])
//!
//! Serialized execution is provided separately by
//! [`Strand`](crate::watch::Strand).
//!
//! # Wait Contract
//!
//! ```text
//! arm(.., callback) ──► wait outstanding ──► callback(Ok(()))            ready
//!                              │
//!                              ├──────────► callback(Err(Canceled))      cancel / re-arm / drop
//!                              └──────────► callback(Err(Io(..)))        reactor error
//! ```
//!
//! A callback is invoked at most once. Implementations may drop a cancelled
//! callback without invoking it, so callers must not rely on seeing
//! `Canceled`.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `runtime` | [`TokioReactor`] on top of tokio's I/O driver and timer |
//! | `manual` | Deterministic reactor driven by tests |

// ============================================================================
// Imports
// ============================================================================

use std::os::fd::RawFd;

use tokio::time::Instant;

use crate::error::Result;
use crate::protocol::Direction;

// ============================================================================
// Submodules
// ============================================================================

/// Tokio-backed reactor.
pub mod runtime;

/// Test reactor with a manual clock.
#[cfg(test)]
pub(crate) mod manual;

// ============================================================================
// Re-exports
// ============================================================================

pub use runtime::TokioReactor;

// ============================================================================
// Types
// ============================================================================

/// Completion callback of a single readiness or timer wait.
pub type WaitCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

// ============================================================================
// Traits
// ============================================================================

/// Event loop the handler schedules its waits on.
pub trait Reactor: Send + Sync {
    /// Starts watching `fd`.
    ///
    /// The returned registration never closes `fd`; dropping it only stops
    /// watching.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registration`](crate::Error::Registration) if the
    /// descriptor cannot be watched.
    fn register(&self, fd: RawFd) -> Result<Box<dyn Registration>>;

    /// Creates an unarmed deadline timer.
    fn timer(&self) -> Box<dyn DeadlineTimer>;
}

/// Reactor-side registration of one descriptor.
///
/// Dropping the registration cancels every outstanding wait.
pub trait Registration: Send + Sync {
    /// Arms a zero-length readiness probe for `direction`.
    ///
    /// `on_ready` runs on a reactor thread once the descriptor is ready or
    /// the wait is cancelled.
    fn arm(&self, direction: Direction, on_ready: WaitCallback);
}

/// One-shot timer that can be re-armed.
///
/// Dropping the timer cancels the outstanding wait.
pub trait DeadlineTimer: Send + Sync {
    /// Current time on the reactor's clock.
    fn now(&self) -> Instant;

    /// Arms the timer for `deadline`, cancelling any previous wait.
    fn arm(&self, deadline: Instant, on_fire: WaitCallback);

    /// Cancels the outstanding wait, if any.
    fn cancel(&self);
}
