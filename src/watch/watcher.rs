//! Per-descriptor readiness watcher.
//!
//! A [`Watcher`] owns the reactor registration of one descriptor and keeps at
//! most one readiness wait outstanding per direction.
//!
//! # Direction State Machine
//!
//! ```text
//!            interest set, CAS pending false→true
//!   Idle ─────────────────────────────────────────► Armed
//!    ▲                                                │ reactor fires
//!    │ interest gone / canceled / error               ▼
//!    └──────────────────────────────────────────── Firing
//!                                                     │ benign + interest:
//!                                                     │ process(), CAS rearm
//!                                                     ▼
//!                                                   Armed
//! ```
//!
//! Callbacks hold only a `Weak<Watcher>`, a `Weak` to the strand and a `Weak`
//! to the connection. Whichever of the three is gone, the callback returns
//! without touching anything.

// ============================================================================
// Imports
// ============================================================================

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, trace, warn};

use crate::error::{CompletionKind, Result};
use crate::protocol::{ConnectionRef, Direction, Events};
use crate::reactor::Registration;

use super::Strand;

// ============================================================================
// DirectionState
// ============================================================================

/// Interest and in-flight state of one direction.
#[derive(Debug, Default)]
struct DirectionState {
    /// The engine wants to hear about this direction.
    wanted: AtomicBool,
    /// A reactor wait is outstanding.
    pending: AtomicBool,
}

impl DirectionState {
    /// Claims the right to issue a wait. Only one caller wins until the wait
    /// completes.
    #[inline]
    fn claim(&self) -> bool {
        self.pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// ============================================================================
// Watcher
// ============================================================================

/// Reactor registration and interest bookkeeping for one descriptor.
pub(crate) struct Watcher {
    /// Descriptor owned by the engine.
    fd: RawFd,
    /// Reactor-side registration. Dropping it cancels outstanding waits and
    /// releases the descriptor without closing it.
    registration: Box<dyn Registration>,
    /// Serialization context owned by the handler.
    strand: Weak<Strand>,
    /// Self-reference handed to callbacks.
    me: Weak<Watcher>,
    read: DirectionState,
    write: DirectionState,
}

impl Watcher {
    /// Creates an idle watcher around `registration`.
    pub(crate) fn new(
        fd: RawFd,
        registration: Box<dyn Registration>,
        strand: Weak<Strand>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            fd,
            registration,
            strand,
            me: me.clone(),
            read: DirectionState::default(),
            write: DirectionState::default(),
        })
    }

    /// Returns the watched descriptor.
    #[inline]
    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    /// Returns the current interest mask.
    pub(crate) fn interest(&self) -> Events {
        Direction::ALL
            .into_iter()
            .filter(|&direction| self.wants(direction))
            .fold(Events::NONE, |mask, direction| mask | direction.events())
    }

    /// Returns `true` if a wait is outstanding for `direction`.
    #[cfg(test)]
    pub(crate) fn is_pending(&self, direction: Direction) -> bool {
        self.state(direction).pending.load(Ordering::Acquire)
    }

    /// Replaces the interest mask and arms a wait for every wanted direction
    /// that has none outstanding.
    ///
    /// Calling again with the same mask while waits are pending issues no new
    /// wait.
    pub(crate) fn set_interest(&self, connection: &ConnectionRef, events: Events) {
        for direction in Direction::ALL {
            let wanted = events.contains(direction.events());
            self.state(direction).wanted.store(wanted, Ordering::Release);

            if wanted {
                self.arm(direction, connection);
            }
        }

        trace!(fd = self.fd, %events, "Interest updated");
    }

    /// Drops all interest so an in-flight callback does not rearm.
    pub(crate) fn retire(&self) {
        for direction in Direction::ALL {
            self.state(direction).wanted.store(false, Ordering::Release);
        }
    }

    #[inline]
    fn state(&self, direction: Direction) -> &DirectionState {
        match direction {
            Direction::Read => &self.read,
            Direction::Write => &self.write,
        }
    }

    #[inline]
    fn wants(&self, direction: Direction) -> bool {
        self.state(direction).wanted.load(Ordering::Acquire)
    }

    /// Issues a wait for `direction` unless one is already outstanding.
    fn arm(&self, direction: Direction, connection: &ConnectionRef) -> bool {
        if !self.state(direction).claim() {
            return false;
        }

        let me = self.me.clone();
        let connection = connection.clone();
        self.registration.arm(
            direction,
            Box::new(move |outcome| Self::on_complete(&me, &connection, direction, outcome)),
        );

        true
    }

    /// Reactor completion entry point. Runs on an arbitrary reactor thread.
    fn on_complete(
        me: &Weak<Self>,
        connection: &ConnectionRef,
        direction: Direction,
        outcome: Result<()>,
    ) {
        let Some(watcher) = me.upgrade() else {
            return;
        };

        watcher.state(direction).pending.store(false, Ordering::Release);

        let Some(strand) = watcher.strand.upgrade() else {
            trace!(fd = watcher.fd, %direction, "Handler gone, wait treated as canceled");
            return;
        };

        strand.dispatch(|| watcher.handle(connection, direction, outcome));
    }

    /// Completion body. Runs inside the strand.
    fn handle(&self, connection: &ConnectionRef, direction: Direction, outcome: Result<()>) {
        match CompletionKind::of(&outcome) {
            CompletionKind::Continue if self.wants(direction) => {
                let Some(engine) = connection.upgrade() else {
                    debug!(fd = self.fd, "Connection gone, watcher idle");
                    return;
                };

                engine.process(self.fd, direction.events());

                // `process` may have changed or dropped the interest.
                if self.wants(direction) {
                    self.arm(direction, connection);
                }
            }
            CompletionKind::Continue => {
                trace!(fd = self.fd, %direction, "Interest withdrawn, direction idle");
            }
            CompletionKind::Canceled => {
                trace!(fd = self.fd, %direction, "Wait canceled");
            }
            CompletionKind::Failed => {
                let Err(error) = outcome else {
                    return;
                };

                warn!(fd = self.fd, %direction, error = %error, "Readiness wait failed, direction idle");

                if let Some(engine) = connection.upgrade() {
                    engine.on_wait_error(Some(self.fd), &error);
                }
            }
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        trace!(fd = self.fd, "Watcher dropped");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Error as IoError, ErrorKind};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::error::Error;
    use crate::protocol::Connection;
    use crate::reactor::Reactor;
    use crate::reactor::manual::ManualReactor;

    const FD: RawFd = 11;

    #[derive(Default)]
    struct Recorder {
        processed: Mutex<Vec<(RawFd, Events)>>,
        errors: Mutex<Vec<Option<RawFd>>>,
    }

    impl Connection for Recorder {
        fn process(&self, fd: RawFd, events: Events) {
            self.processed.lock().push((fd, events));
        }

        fn heartbeat(&self) {}

        fn on_wait_error(&self, fd: Option<RawFd>, _error: &Error) {
            self.errors.lock().push(fd);
        }
    }

    struct Fixture {
        reactor: ManualReactor,
        strand: Arc<Strand>,
        recorder: Arc<Recorder>,
        connection: ConnectionRef,
        watcher: Arc<Watcher>,
    }

    fn fixture() -> Fixture {
        let reactor = ManualReactor::new();
        let strand = Arc::new(Strand::new());
        let recorder = Arc::new(Recorder::default());
        let connection: ConnectionRef = Arc::downgrade(&recorder) as ConnectionRef;
        let registration = reactor.register(FD).expect("register");
        let watcher = Watcher::new(FD, registration, Arc::downgrade(&strand));
        Fixture {
            reactor,
            strand,
            recorder,
            connection,
            watcher,
        }
    }

    #[test]
    fn test_new_watcher_is_idle() {
        let f = fixture();
        assert_eq!(f.watcher.fd(), FD);
        assert!(f.watcher.interest().is_empty());
        assert!(!f.watcher.is_pending(Direction::Read));
        assert_eq!(f.reactor.arms(FD, Direction::Read), 0);
    }

    #[test]
    fn test_set_interest_arms_each_wanted_direction() {
        let f = fixture();
        f.watcher
            .set_interest(&f.connection, Events::READABLE | Events::WRITABLE);

        assert_eq!(f.reactor.outstanding(FD, Direction::Read), 1);
        assert_eq!(f.reactor.outstanding(FD, Direction::Write), 1);
        assert!(f.watcher.is_pending(Direction::Read));
        assert!(f.watcher.is_pending(Direction::Write));
    }

    #[test]
    fn test_repeated_set_interest_arms_once() {
        let f = fixture();
        for _ in 0..3 {
            f.watcher
                .set_interest(&f.connection, Events::READABLE | Events::WRITABLE);
        }

        assert_eq!(f.reactor.arms(FD, Direction::Read), 1);
        assert_eq!(f.reactor.arms(FD, Direction::Write), 1);
    }

    #[test]
    fn test_benign_completion_processes_and_rearms_once() {
        let f = fixture();
        f.watcher.set_interest(&f.connection, Events::READABLE);

        assert!(f.reactor.fire(FD, Direction::Read));

        assert_eq!(*f.recorder.processed.lock(), vec![(FD, Events::READABLE)]);
        assert_eq!(f.reactor.outstanding(FD, Direction::Read), 1);
        assert_eq!(f.reactor.arms(FD, Direction::Read), 2);
        assert!(f.watcher.is_pending(Direction::Read));
    }

    #[test]
    fn test_would_block_counts_as_benign() {
        let f = fixture();
        f.watcher.set_interest(&f.connection, Events::WRITABLE);

        let would_block = Err(IoError::from(ErrorKind::WouldBlock).into());
        assert!(f.reactor.complete(FD, Direction::Write, would_block));

        assert_eq!(*f.recorder.processed.lock(), vec![(FD, Events::WRITABLE)]);
        assert_eq!(f.reactor.outstanding(FD, Direction::Write), 1);
    }

    #[test]
    fn test_withdrawn_interest_goes_idle() {
        let f = fixture();
        f.watcher
            .set_interest(&f.connection, Events::READABLE | Events::WRITABLE);
        f.watcher.set_interest(&f.connection, Events::READABLE);

        assert!(f.reactor.fire(FD, Direction::Write));

        assert!(f.recorder.processed.lock().is_empty());
        assert_eq!(f.reactor.outstanding(FD, Direction::Write), 0);
        assert!(!f.watcher.is_pending(Direction::Write));
        assert_eq!(f.watcher.interest(), Events::READABLE);
    }

    #[test]
    fn test_canceled_completion_goes_idle() {
        let f = fixture();
        f.watcher.set_interest(&f.connection, Events::READABLE);

        assert!(f.reactor.complete(FD, Direction::Read, Err(Error::Canceled)));

        assert!(f.recorder.processed.lock().is_empty());
        assert!(f.recorder.errors.lock().is_empty());
        assert_eq!(f.reactor.outstanding(FD, Direction::Read), 0);
    }

    #[test]
    fn test_other_error_goes_idle_and_notifies_hook() {
        let f = fixture();
        f.watcher.set_interest(&f.connection, Events::READABLE);

        let reset = Err(IoError::from(ErrorKind::ConnectionReset).into());
        assert!(f.reactor.complete(FD, Direction::Read, reset));

        assert!(f.recorder.processed.lock().is_empty());
        assert_eq!(*f.recorder.errors.lock(), vec![Some(FD)]);
        assert_eq!(f.reactor.outstanding(FD, Direction::Read), 0);

        // Interest is still set, so a new request re-arms.
        f.watcher.set_interest(&f.connection, Events::READABLE);
        assert_eq!(f.reactor.outstanding(FD, Direction::Read), 1);
    }

    #[test]
    fn test_queued_callback_after_drop_is_noop() {
        let f = fixture();
        f.watcher.set_interest(&f.connection, Events::READABLE);
        let queued = f.reactor.take_io(FD, Direction::Read).expect("wait armed");

        drop(f.watcher);
        queued(Ok(()));

        assert!(f.recorder.processed.lock().is_empty());
        assert_eq!(f.reactor.released(), vec![FD]);
    }

    #[test]
    fn test_drop_cancels_outstanding_waits() {
        let f = fixture();
        f.watcher
            .set_interest(&f.connection, Events::READABLE | Events::WRITABLE);

        drop(f.watcher);

        assert_eq!(f.reactor.outstanding(FD, Direction::Read), 0);
        assert_eq!(f.reactor.outstanding(FD, Direction::Write), 0);
        assert_eq!(f.reactor.deliver_canceled(), 2);
        assert!(f.recorder.processed.lock().is_empty());
    }

    #[test]
    fn test_expired_strand_is_cancellation() {
        let f = fixture();
        f.watcher.set_interest(&f.connection, Events::READABLE);

        drop(f.strand);
        assert!(f.reactor.fire(FD, Direction::Read));

        assert!(f.recorder.processed.lock().is_empty());
        assert_eq!(f.reactor.outstanding(FD, Direction::Read), 0);
        assert!(!f.watcher.is_pending(Direction::Read));
    }

    #[test]
    fn test_dropped_connection_stops_forwarding() {
        let f = fixture();
        f.watcher.set_interest(&f.connection, Events::READABLE);

        drop(f.recorder);
        assert!(f.reactor.fire(FD, Direction::Read));

        assert_eq!(f.reactor.outstanding(FD, Direction::Read), 0);
    }

    #[test]
    fn test_retire_prevents_rearm() {
        let f = fixture();
        f.watcher.set_interest(&f.connection, Events::READABLE);
        f.watcher.retire();

        assert!(f.reactor.fire(FD, Direction::Read));

        assert!(f.recorder.processed.lock().is_empty());
        assert_eq!(f.reactor.outstanding(FD, Direction::Read), 0);
    }

    #[test]
    fn test_set_interest_during_pending_completion_does_not_double_arm() {
        let f = fixture();
        f.watcher.set_interest(&f.connection, Events::READABLE);

        // Completion is queued; engine re-requests interest before it runs.
        let queued = f.reactor.take_io(FD, Direction::Read).expect("wait armed");
        f.watcher.set_interest(&f.connection, Events::READABLE);
        assert_eq!(f.reactor.arms(FD, Direction::Read), 1);

        queued(Ok(()));

        assert_eq!(f.reactor.outstanding(FD, Direction::Read), 1);
        assert_eq!(f.reactor.arms(FD, Direction::Read), 2);
    }
}
