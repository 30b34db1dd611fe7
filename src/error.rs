//! Error types for the reactor adapter.
//!
//! This module defines the crate error type and the classification of wait
//! completions delivered by a reactor.
//!
//! # Usage
//!
//! Fallible setup operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use amqp_reactor::{Events, Handler, Result};
//!
//! fn watch(handler: &mut Handler, conn: &ConnectionHandle, fd: RawFd) -> Result<()> {
//!     handler.monitor(conn, fd, Events::READABLE)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Registration | [`Error::Registration`] |
//! | Wait completion | [`Error::Canceled`], [`Error::Io`] |
//!
//! # Completion Taxonomy
//!
//! Every wait armed on a reactor completes with a `Result<()>`.
//! [`CompletionKind::of`] sorts that outcome into one of three buckets:
//!
//! | Kind | Outcome | Action |
//! |------|---------|--------|
//! | [`CompletionKind::Continue`] | `Ok(())` or `WouldBlock` | forward and rearm |
//! | [`CompletionKind::Canceled`] | [`Error::Canceled`] | stop quietly |
//! | [`CompletionKind::Failed`] | any other error | stop, log, notify hook |

// ============================================================================
// Imports
// ============================================================================

use std::io::{Error as IoError, ErrorKind};
use std::os::fd::RawFd;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a handler or reactor cannot be built from the given
    /// configuration, for example when no tokio runtime is reachable.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Registration Errors
    // ========================================================================
    /// The reactor refused to watch a descriptor.
    #[error("Failed to register descriptor {fd}: {source}")]
    Registration {
        /// Descriptor the protocol engine asked to monitor.
        fd: RawFd,
        /// Underlying OS error.
        #[source]
        source: IoError,
    },

    // ========================================================================
    // Completion Errors
    // ========================================================================
    /// The wait was cancelled before it completed.
    ///
    /// This is the expected outcome of shutdown in progress, never a failure.
    #[error("Operation canceled")]
    Canceled,

    /// IO error reported by the reactor.
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a registration error for `fd`.
    #[inline]
    pub fn registration(fd: RawFd, source: IoError) -> Self {
        Self::Registration { fd, source }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a cancellation.
    #[inline]
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Returns `true` if this is the reactor's "would block" pseudo-error.
    #[inline]
    #[must_use]
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::Io(err) if err.kind() == ErrorKind::WouldBlock)
    }

    /// Returns `true` if a wait completing with this error should still be
    /// forwarded to the protocol engine.
    #[inline]
    #[must_use]
    pub fn is_benign(&self) -> bool {
        self.is_would_block()
    }
}

// ============================================================================
// CompletionKind
// ============================================================================

/// Classification of a reactor wait outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    /// No error, or "would block". Forward the event and rearm.
    Continue,
    /// Explicit cancellation. Stop rearming, surface nothing.
    Canceled,
    /// Any other reactor error. Stop rearming.
    Failed,
}

impl CompletionKind {
    /// Classifies the outcome of a completed wait.
    #[must_use]
    pub fn of(outcome: &Result<()>) -> Self {
        match outcome {
            Ok(()) => Self::Continue,
            Err(err) if err.is_benign() => Self::Continue,
            Err(err) if err.is_canceled() => Self::Canceled,
            Err(_) => Self::Failed,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
