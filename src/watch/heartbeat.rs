//! Periodic heartbeat timer.
//!
//! The timer keeps one wait outstanding and reschedules from the previous
//! deadline, never from the time the callback ran. A callback delayed by
//! scheduler contention therefore does not push later heartbeats back:
//!
//! ```text
//! deadline:  D0 ──── I ──── D1 ──── I ──── D2
//! fired at:   D0+δ           D1+δ'          ...
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{CompletionKind, Result};
use crate::protocol::ConnectionRef;
use crate::reactor::DeadlineTimer;

use super::Strand;

// ============================================================================
// Schedule
// ============================================================================

/// Current configuration of the timer.
#[derive(Debug, Default, Clone, Copy)]
struct Schedule {
    /// Negotiated interval, `None` until the first `set`.
    interval: Option<Duration>,
    /// Deadline of the outstanding wait.
    deadline: Option<Instant>,
    /// Bumped by every `set` and `stop`. Completions of an older generation
    /// are treated as cancelled even if they slipped past the reactor's
    /// cancellation.
    generation: u64,
}

// ============================================================================
// HeartbeatTimer
// ============================================================================

/// Recurring timer that calls [`Connection::heartbeat`](crate::Connection::heartbeat).
pub(crate) struct HeartbeatTimer {
    /// Reactor timer. Dropping it cancels the outstanding wait.
    timer: Box<dyn DeadlineTimer>,
    /// Serialization context owned by the handler.
    strand: Weak<Strand>,
    /// Self-reference handed to callbacks.
    me: Weak<HeartbeatTimer>,
    schedule: Mutex<Schedule>,
}

impl HeartbeatTimer {
    /// Creates an unarmed timer.
    pub(crate) fn new(timer: Box<dyn DeadlineTimer>, strand: Weak<Strand>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            timer,
            strand,
            me: me.clone(),
            schedule: Mutex::new(Schedule::default()),
        })
    }

    /// Cancels any outstanding wait and arms one for `interval_secs` from now.
    ///
    /// A zero interval disables heartbeats and is filtered out by the handler
    /// before it gets here.
    pub(crate) fn set(&self, connection: &ConnectionRef, interval_secs: u16) {
        debug_assert!(interval_secs > 0, "zero heartbeat interval reached the timer");

        self.timer.cancel();

        let interval = Duration::from_secs(u64::from(interval_secs));
        let (deadline, generation) = {
            let mut schedule = self.schedule.lock();
            schedule.generation += 1;
            schedule.interval = Some(interval);

            let deadline = self.timer.now() + interval;
            schedule.deadline = Some(deadline);
            (deadline, schedule.generation)
        };

        self.arm(deadline, generation, connection);
        debug!(interval_secs, "Heartbeat timer set");
    }

    /// Cancels the outstanding wait. The timer can be set again later.
    pub(crate) fn stop(&self) {
        {
            let mut schedule = self.schedule.lock();
            schedule.generation += 1;
            schedule.deadline = None;
        }
        self.timer.cancel();
        trace!("Heartbeat timer stopped");
    }

    /// Returns the configured interval.
    #[inline]
    pub(crate) fn interval(&self) -> Option<Duration> {
        self.schedule.lock().interval
    }

    /// Returns the deadline of the outstanding wait.
    #[inline]
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.schedule.lock().deadline
    }

    fn arm(&self, deadline: Instant, generation: u64, connection: &ConnectionRef) {
        let me = self.me.clone();
        let connection = connection.clone();
        self.timer.arm(
            deadline,
            Box::new(move |outcome| Self::on_fire(&me, &connection, generation, outcome)),
        );
    }

    /// Reactor completion entry point. Runs on an arbitrary reactor thread.
    fn on_fire(me: &Weak<Self>, connection: &ConnectionRef, generation: u64, outcome: Result<()>) {
        let Some(timer) = me.upgrade() else {
            return;
        };

        let Some(strand) = timer.strand.upgrade() else {
            trace!("Handler gone, heartbeat treated as canceled");
            return;
        };

        strand.dispatch(|| timer.handle(connection, generation, outcome));
    }

    /// Completion body. Runs inside the strand.
    fn handle(&self, connection: &ConnectionRef, generation: u64, outcome: Result<()>) {
        match CompletionKind::of(&outcome) {
            CompletionKind::Continue => {
                if self.schedule.lock().generation != generation {
                    trace!(generation, "Stale heartbeat completion ignored");
                    return;
                }

                let Some(engine) = connection.upgrade() else {
                    debug!("Connection gone, heartbeat timer idle");
                    return;
                };

                engine.heartbeat();

                // The engine may have reconfigured or stopped the timer from
                // inside `heartbeat`.
                let next = {
                    let mut schedule = self.schedule.lock();
                    match (schedule.generation == generation, schedule.deadline, schedule.interval)
                    {
                        (true, Some(deadline), Some(interval)) => {
                            let next = deadline + interval;
                            schedule.deadline = Some(next);
                            Some(next)
                        }
                        _ => None,
                    }
                };

                if let Some(next) = next {
                    self.arm(next, generation, connection);
                }
            }
            CompletionKind::Canceled => {
                trace!(generation, "Heartbeat wait canceled");
            }
            CompletionKind::Failed => {
                let Err(error) = outcome else {
                    return;
                };

                {
                    let mut schedule = self.schedule.lock();
                    if schedule.generation != generation {
                        trace!(generation, error = %error, "Stale heartbeat failure ignored");
                        return;
                    }
                    schedule.deadline = None;
                }

                warn!(error = %error, "Heartbeat wait failed, timer idle");

                if let Some(engine) = connection.upgrade() {
                    engine.on_wait_error(None, &error);
                }
            }
        }
    }
}

impl Drop for HeartbeatTimer {
    fn drop(&mut self) {
        trace!("Heartbeat timer dropped");
    }
}

// ============================================================================
// Tests
// ============================================================================
