//! Reactor registration options.
//!
//! Options are plain data so they can be embedded in an application's own
//! configuration file.
//!
//! # Example
//!
//! ```ignore
//! use amqp_reactor::ReactorOptions;
//!
//! let options = ReactorOptions::new().with_nonblocking(false);
//! assert!(!options.is_nonblocking());
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// ReactorOptions
// ============================================================================

/// How descriptors are handed to the reactor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactorOptions {
    /// Switch monitored descriptors to non-blocking mode on registration.
    ///
    /// The flag lives on the open file description, so it is visible to the
    /// engine as well. Enabled by default.
    pub nonblocking: bool,
}

impl Default for ReactorOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ReactorOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { nonblocking: true }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ReactorOptions {
    /// Sets whether descriptors are switched to non-blocking mode.
    #[inline]
    #[must_use]
    pub const fn with_nonblocking(mut self, nonblocking: bool) -> Self {
        self.nonblocking = nonblocking;
        self
    }

    /// Returns `true` if descriptors are switched to non-blocking mode.
    #[inline]
    #[must_use]
    pub const fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }
}

// ============================================================================
// Tests
// ============================================================================
