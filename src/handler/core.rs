//! The handler the protocol engine talks to.
//!
//! [`Handler`] implements the three hooks the engine calls: [`Handler::monitor`],
//! [`Handler::on_negotiate`] and [`Handler::on_closed`]. It owns the
//! descriptor registry, the strand and the heartbeat timer.

// ============================================================================
// Imports
// ============================================================================

use std::collections::hash_map::Entry;
use std::fmt;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::error::Result;
use crate::protocol::{ConnectionHandle, ConnectionRef, Events};
use crate::reactor::Reactor;
use crate::watch::{HeartbeatTimer, Strand, Watcher};

use super::builder::HandlerBuilder;

// ============================================================================
// Types
// ============================================================================

/// Registry of active watchers keyed by descriptor.
type WatchRegistry = FxHashMap<RawFd, Arc<Watcher>>;

// ============================================================================
// Handler
// ============================================================================

/// Bridges a descriptor-based protocol engine onto a [`Reactor`].
///
/// One handler serves one connection.
///
/// # Thread Safety
///
/// Reactor callbacks may run on any worker thread; they are serialized by the
/// handler's [`Strand`]. The registry itself is not locked: calls to
/// [`monitor`](Self::monitor) from outside a callback must enter the strand
/// through a cloned handle, since `monitor` borrows the handler mutably:
///
/// ```ignore
/// let strand = Arc::clone(handler.strand());
/// strand.dispatch(|| handler.monitor(&connection, fd, Events::WRITABLE))?;
/// ```
///
/// Calls made from inside [`Connection::process`](crate::Connection::process)
/// already run in the strand.
///
/// # Example
///
/// ```ignore
/// use amqp_reactor::{Events, Handler};
///
/// let mut handler = Handler::builder().build()?;
/// handler.monitor(&connection, fd, Events::READABLE)?;
/// let accepted = handler.on_negotiate(&connection, 60);
/// // ...
/// handler.on_closed(&connection);
/// ```
pub struct Handler {
    /// Reactor waits are scheduled on.
    reactor: Arc<dyn Reactor>,
    /// Active watchers.
    watchers: WatchRegistry,
    /// Heartbeat timer, discarded when the connection closes.
    timer: Option<Arc<HeartbeatTimer>>,
    /// Sole strong owner of the serialization context.
    strand: Arc<Strand>,
}

// ============================================================================
// Handler - Constructor
// ============================================================================

impl Handler {
    /// Creates a handler on `reactor`.
    #[must_use]
    pub fn new(reactor: Arc<dyn Reactor>) -> Self {
        let strand = Arc::new(Strand::new());
        let timer = HeartbeatTimer::new(reactor.timer(), Arc::downgrade(&strand));

        Self {
            reactor,
            watchers: WatchRegistry::default(),
            timer: Some(timer),
            strand,
        }
    }

    /// Creates a builder for configuring a handler.
    #[inline]
    #[must_use]
    pub fn builder() -> HandlerBuilder {
        HandlerBuilder::new()
    }
}

// ============================================================================
// Handler - Engine Hooks
// ============================================================================

impl Handler {
    /// Registers, updates or removes interest in `fd`.
    ///
    /// | Registry | `events` | Effect |
    /// |----------|----------|--------|
    /// | absent | empty | nothing |
    /// | absent | non-empty | watcher created, waits armed |
    /// | present | empty | watcher removed, waits cancelled, `fd` left open |
    /// | present | non-empty | interest updated |
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registration`](crate::Error::Registration) if the
    /// reactor refuses the descriptor. The registry is left unchanged.
    pub fn monitor(&mut self, connection: &ConnectionHandle, fd: RawFd, events: Events) -> Result<()> {
        let connection: ConnectionRef = Arc::downgrade(connection);

        match self.watchers.entry(fd) {
            Entry::Vacant(_) if events.is_empty() => {}
            Entry::Vacant(slot) => {
                let registration = self.reactor.register(fd)?;
                let watcher = Watcher::new(fd, registration, Arc::downgrade(&self.strand));
                slot.insert(Arc::clone(&watcher));
                watcher.set_interest(&connection, events);
                debug!(fd, %events, "Watcher created");
            }
            Entry::Occupied(slot) if events.is_empty() => {
                let watcher = slot.remove();
                watcher.retire();
                debug!(fd = watcher.fd(), "Watcher removed");
            }
            Entry::Occupied(slot) => {
                slot.get().set_interest(&connection, events);
            }
        }

        Ok(())
    }

    /// Handles the heartbeat interval proposed during negotiation.
    ///
    /// Zero disables heartbeats and leaves the timer unset. Any other value is
    /// accepted unchanged and (re)starts the timer.
    pub fn on_negotiate(&mut self, connection: &ConnectionHandle, interval: u16) -> u16 {
        if interval == 0 {
            debug!("Heartbeats disabled by negotiation");
            return 0;
        }

        let connection: ConnectionRef = Arc::downgrade(connection);
        let strand = Arc::downgrade(&self.strand);
        let reactor = &self.reactor;

        self.timer
            .get_or_insert_with(|| HeartbeatTimer::new(reactor.timer(), strand))
            .set(&connection, interval);

        interval
    }

    /// Stops recurring work once the connection has ended.
    ///
    /// Discards the heartbeat timer so no further heartbeat is scheduled and
    /// the reactor has nothing left to keep it running. Watchers are left to
    /// the engine, which removes them through [`monitor`](Self::monitor).
    pub fn on_closed(&mut self, _connection: &ConnectionHandle) {
        if let Some(timer) = self.timer.take() {
            timer.stop();
        }

        info!(watchers = self.watchers.len(), "Connection closed, heartbeat timer released");
    }
}

// ============================================================================
// Handler - Accessors
// ============================================================================

impl Handler {
    /// Returns the reactor this handler schedules on.
    #[inline]
    #[must_use]
    pub fn reactor(&self) -> &Arc<dyn Reactor> {
        &self.reactor
    }

    /// Returns the serialization context shared with every callback.
    #[inline]
    #[must_use]
    pub fn strand(&self) -> &Arc<Strand> {
        &self.strand
    }

    /// Runs `f` inside the handler's strand.
    ///
    /// Nested calls from inside a callback run inline. `f` cannot borrow the
    /// handler mutably; for [`monitor`](Self::monitor) dispatch on a clone of
    /// [`strand`](Self::strand) instead.
    #[inline]
    pub fn dispatch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.strand.dispatch(f)
    }

    /// Returns `true` if `fd` has a watcher.
    #[inline]
    #[must_use]
    pub fn is_watching(&self, fd: RawFd) -> bool {
        self.watchers.contains_key(&fd)
    }

    /// Returns the current interest for `fd`, or `None` if it is not watched.
    #[must_use]
    pub fn interest(&self, fd: RawFd) -> Option<Events> {
        self.watchers.get(&fd).map(|watcher| watcher.interest())
    }

    /// Returns the number of watched descriptors.
    #[inline]
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Returns the heartbeat interval, or `None` if heartbeats are not running.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.timer
            .as_ref()
            .filter(|timer| timer.deadline().is_some())
            .and_then(|timer| timer.interval())
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("watchers", &self.watchers.len())
            .field("heartbeat", &self.heartbeat_interval())
            .finish_non_exhaustive()
    }
}

impl Drop for Handler {
    fn drop(&mut self) {
        debug!(watchers = self.watchers.len(), "Handler dropped");
    }
}

// ============================================================================
// Tests
// ============================================================================
