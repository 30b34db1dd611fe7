//! Serialization context shared by every callback of one handler.
//!
//! A [`Strand`] runs closures mutually exclusively no matter which reactor
//! thread delivers them. It is re-entrant: a closure already running inside
//! the strand can dispatch again and the nested closure runs inline, so the
//! engine may call back into the handler from `process` or `heartbeat`.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::ReentrantMutex;

// ============================================================================
// Strand
// ============================================================================

/// Mutual-exclusion context for handler callbacks.
///
/// The handler is its sole strong owner. Watchers and the heartbeat timer hold
/// it through a `Weak`, and a failed upgrade means the handler is gone.
#[derive(Debug, Default)]
pub struct Strand {
    lock: ReentrantMutex<()>,
}

impl Strand {
    /// Creates a new strand.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` inside the strand and returns its result.
    ///
    /// Blocks while another thread is inside the strand.
    #[inline]
    pub fn dispatch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock.lock();
        f()
    }

    /// Returns `true` if some thread is currently inside the strand.
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.lock.is_locked()
    }
}

// ============================================================================
// Tests
// ============================================================================
