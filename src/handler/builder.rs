//! Builder pattern for handler configuration.
//!
//! Provides a fluent API for configuring and creating [`Handler`] instances.
//!
//! # Example
//!
//! ```no_run
//! use amqp_reactor::Handler;
//!
//! # fn example() -> amqp_reactor::Result<()> {
//! let runtime = tokio::runtime::Runtime::new()?;
//! let handler = Handler::builder()
//!     .runtime(runtime.handle().clone())
//!     .nonblocking(true)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::error::{Error, Result};
use crate::reactor::{Reactor, TokioReactor};

use super::core::Handler;
use super::options::ReactorOptions;

// ============================================================================
// HandlerBuilder
// ============================================================================

/// Builder for configuring a [`Handler`] instance.
///
/// Use [`Handler::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct HandlerBuilder {
    /// Runtime to schedule waits on. Defaults to the current runtime.
    runtime: Option<Handle>,
    /// Registration options for the Tokio reactor.
    options: ReactorOptions,
    /// Custom reactor, replaces the Tokio reactor entirely.
    reactor: Option<Arc<dyn Reactor>>,
}

// ============================================================================
// HandlerBuilder Implementation
// ============================================================================

impl HandlerBuilder {
    /// Creates a new builder with default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Tokio runtime waits are scheduled on.
    ///
    /// # Arguments
    ///
    /// * `runtime` - Handle of a running multi-thread or current-thread runtime
    #[inline]
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Replaces the registration options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ReactorOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets whether monitored descriptors are switched to non-blocking mode.
    #[inline]
    #[must_use]
    pub fn nonblocking(mut self, nonblocking: bool) -> Self {
        self.options = self.options.with_nonblocking(nonblocking);
        self
    }

    /// Uses a custom reactor instead of the Tokio one.
    ///
    /// Runtime and options are ignored when a reactor is set.
    ///
    /// # Arguments
    ///
    /// * `reactor` - Reactor implementation shared with the handler
    #[inline]
    #[must_use]
    pub fn reactor(mut self, reactor: Arc<dyn Reactor>) -> Self {
        self.reactor = Some(reactor);
        self
    }

    /// Builds the handler.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if neither a runtime nor a reactor is set and the
    ///   caller is not inside a Tokio runtime
    pub fn build(self) -> Result<Handler> {
        let reactor = self.resolve_reactor()?;
        Ok(Handler::new(reactor))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl HandlerBuilder {
    /// Picks the reactor the handler will use.
    fn resolve_reactor(self) -> Result<Arc<dyn Reactor>> {
        if let Some(reactor) = self.reactor {
            return Ok(reactor);
        }

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| {
                Error::config(
                    "No Tokio runtime available. Build inside a runtime or use .runtime() to set one.\n\
                     Example: Handler::builder().runtime(runtime.handle().clone())",
                )
            })?,
        };

        Ok(Arc::new(TokioReactor::with_handle(runtime, self.options)))
    }
}

impl fmt::Debug for HandlerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBuilder")
            .field("runtime", &self.runtime.is_some())
            .field("options", &self.options)
            .field("reactor", &self.reactor.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
