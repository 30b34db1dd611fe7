//! The protocol engine as seen from the adapter.
//!
//! The engine owns the wire protocol and the descriptors. The adapter only
//! tells it when a descriptor became ready and when a heartbeat is due.

// ============================================================================
// Imports
// ============================================================================

use std::os::fd::RawFd;
use std::sync::{Arc, Weak};

use crate::error::Error;

use super::Events;

// ============================================================================
// Types
// ============================================================================

/// Shared handle the engine passes into every [`Handler`](crate::Handler) hook.
pub type ConnectionHandle = Arc<dyn Connection>;

/// Non-owning handle captured by reactor callbacks.
pub(crate) type ConnectionRef = Weak<dyn Connection>;

// ============================================================================
// Connection
// ============================================================================

/// Callbacks the adapter invokes on the protocol engine.
///
/// Both methods run inline on a reactor thread, inside the handler's strand,
/// and must return quickly. They may call back into the handler (for example
/// [`Handler::monitor`](crate::Handler::monitor) from `process`).
pub trait Connection: Send + Sync {
    /// Called when `fd` became ready in the direction given by `events`.
    ///
    /// The engine performs the actual reads or writes on the raw descriptor.
    fn process(&self, fd: RawFd, events: Events);

    /// Called each time the negotiated heartbeat interval elapses.
    fn heartbeat(&self);

    /// Called when a readiness or timer wait failed with an error other than
    /// cancellation. `fd` is `None` for the heartbeat timer.
    ///
    /// After this call the affected direction or timer is idle. The default
    /// does nothing and leaves detection to the engine's own heartbeat
    /// timeout.
    fn on_wait_error(&self, fd: Option<RawFd>, error: &Error) {
        let _ = (fd, error);
    }
}
