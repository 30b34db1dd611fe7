//! Deterministic reactor for tests.
//!
//! Nothing happens on its own: waits sit in queues until the test fires,
//! completes or takes them, and time only moves through [`ManualReactor::advance`].
//! Cancelled callbacks are parked and delivered on request, which lets a test
//! decide whether a cancellation reaches its callback before or after teardown.

use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::protocol::Direction;

use super::{DeadlineTimer, Reactor, Registration, WaitCallback};

struct IoWait {
    fd: RawFd,
    registration: u64,
    direction: Direction,
    callback: WaitCallback,
}

struct TimerWait {
    timer: u64,
    deadline: Instant,
    callback: WaitCallback,
}

struct ManualState {
    now: Instant,
    next_id: u64,
    io: Vec<IoWait>,
    timers: Vec<TimerWait>,
    canceled: Vec<WaitCallback>,
    io_arms: FxHashMap<(RawFd, Direction), usize>,
    timer_arms: usize,
    live: FxHashMap<RawFd, usize>,
    released: Vec<RawFd>,
    refused: FxHashSet<RawFd>,
}

impl ManualState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn cancel_timer(&mut self, timer: u64) {
        let (canceled, kept): (Vec<_>, Vec<_>) =
            self.timers.drain(..).partition(|wait| wait.timer == timer);
        self.timers = kept;
        self.canceled
            .extend(canceled.into_iter().map(|wait| wait.callback));
    }
}

/// Reactor whose waits are completed by hand.
#[derive(Clone)]
pub(crate) struct ManualReactor {
    state: Arc<Mutex<ManualState>>,
}

impl ManualReactor {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: Instant::now(),
                next_id: 0,
                io: Vec::new(),
                timers: Vec::new(),
                canceled: Vec::new(),
                io_arms: FxHashMap::default(),
                timer_arms: 0,
                live: FxHashMap::default(),
                released: Vec::new(),
                refused: FxHashSet::default(),
            })),
        }
    }

    // ── Clock ───────────────────────────────────────────────────────

    pub(crate) fn now(&self) -> Instant {
        self.state.lock().now
    }

    pub(crate) fn advance(&self, by: Duration) {
        self.state.lock().now += by;
    }

    // ── Readiness ───────────────────────────────────────────────────

    /// Makes the next `register(fd)` fail.
    pub(crate) fn refuse(&self, fd: RawFd) {
        self.state.lock().refused.insert(fd);
    }

    /// Completes the oldest outstanding wait for `fd`/`direction` with `Ok`.
    pub(crate) fn fire(&self, fd: RawFd, direction: Direction) -> bool {
        self.complete(fd, direction, Ok(()))
    }

    /// Completes the oldest outstanding wait for `fd`/`direction`.
    pub(crate) fn complete(&self, fd: RawFd, direction: Direction, outcome: Result<()>) -> bool {
        match self.take_io(fd, direction) {
            Some(callback) => {
                callback(outcome);
                true
            }
            None => false,
        }
    }

    /// Removes the oldest outstanding wait without invoking it, as if the
    /// reactor had already queued its completion.
    pub(crate) fn take_io(&self, fd: RawFd, direction: Direction) -> Option<WaitCallback> {
        let mut state = self.state.lock();
        let index = state
            .io
            .iter()
            .position(|wait| wait.fd == fd && wait.direction == direction)?;
        Some(state.io.remove(index).callback)
    }

    /// Number of waits currently outstanding for `fd`/`direction`.
    pub(crate) fn outstanding(&self, fd: RawFd, direction: Direction) -> usize {
        self.state
            .lock()
            .io
            .iter()
            .filter(|wait| wait.fd == fd && wait.direction == direction)
            .count()
    }

    /// Number of waits ever armed for `fd`/`direction`.
    pub(crate) fn arms(&self, fd: RawFd, direction: Direction) -> usize {
        self.state
            .lock()
            .io_arms
            .get(&(fd, direction))
            .copied()
            .unwrap_or(0)
    }

    /// Number of live registrations for `fd`.
    pub(crate) fn registrations(&self, fd: RawFd) -> usize {
        self.state.lock().live.get(&fd).copied().unwrap_or(0)
    }

    /// Descriptors whose registration was dropped, in order.
    pub(crate) fn released(&self) -> Vec<RawFd> {
        self.state.lock().released.clone()
    }

    // ── Timers ──────────────────────────────────────────────────────

    /// Deadlines of every outstanding timer wait, earliest first.
    pub(crate) fn deadlines(&self) -> Vec<Instant> {
        let mut deadlines: Vec<_> = self
            .state
            .lock()
            .timers
            .iter()
            .map(|wait| wait.deadline)
            .collect();
        deadlines.sort();
        deadlines
    }

    /// Number of timer waits ever armed.
    pub(crate) fn timer_arms(&self) -> usize {
        self.state.lock().timer_arms
    }

    /// Removes the earliest outstanding timer wait without invoking it.
    pub(crate) fn take_timer(&self) -> Option<(Instant, WaitCallback)> {
        let mut state = self.state.lock();
        let index = state
            .timers
            .iter()
            .enumerate()
            .min_by_key(|(_, wait)| wait.deadline)
            .map(|(index, _)| index)?;
        let wait = state.timers.remove(index);
        Some((wait.deadline, wait.callback))
    }

    /// Fires every timer wait due at the current time, including waits armed
    /// by the callbacks themselves. Returns the number fired.
    pub(crate) fn fire_due_timers(&self) -> usize {
        let mut fired = 0;
        loop {
            let due = {
                let mut state = self.state.lock();
                let now = state.now;
                let index = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, wait)| wait.deadline <= now)
                    .min_by_key(|(_, wait)| wait.deadline)
                    .map(|(index, _)| index);
                index.map(|index| state.timers.remove(index).callback)
            };

            match due {
                Some(callback) => {
                    callback(Ok(()));
                    fired += 1;
                }
                None => return fired,
            }
        }
    }

    // ── Cancellation ────────────────────────────────────────────────

    /// Number of cancelled callbacks not yet delivered.
    pub(crate) fn canceled(&self) -> usize {
        self.state.lock().canceled.len()
    }

    /// Delivers `Canceled` to every parked callback. Returns the count.
    pub(crate) fn deliver_canceled(&self) -> usize {
        let callbacks = std::mem::take(&mut self.state.lock().canceled);
        let count = callbacks.len();
        for callback in callbacks {
            callback(Err(Error::Canceled));
        }
        count
    }
}

impl Reactor for ManualReactor {
    fn register(&self, fd: RawFd) -> Result<Box<dyn Registration>> {
        let mut state = self.state.lock();
        if state.refused.remove(&fd) {
            return Err(Error::registration(
                fd,
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ));
        }

        let id = state.next_id();
        *state.live.entry(fd).or_default() += 1;

        Ok(Box::new(ManualRegistration {
            id,
            fd,
            state: Arc::clone(&self.state),
        }))
    }

    fn timer(&self) -> Box<dyn DeadlineTimer> {
        let id = self.state.lock().next_id();
        Box::new(ManualTimer {
            id,
            state: Arc::clone(&self.state),
        })
    }
}

struct ManualRegistration {
    id: u64,
    fd: RawFd,
    state: Arc<Mutex<ManualState>>,
}

impl Registration for ManualRegistration {
    fn arm(&self, direction: Direction, on_ready: WaitCallback) {
        let mut state = self.state.lock();
        *state.io_arms.entry((self.fd, direction)).or_default() += 1;
        state.io.push(IoWait {
            fd: self.fd,
            registration: self.id,
            direction,
            callback: on_ready,
        });
    }
}

impl Drop for ManualRegistration {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        let (canceled, kept): (Vec<_>, Vec<_>) = state
            .io
            .drain(..)
            .partition(|wait| wait.registration == self.id);
        state.io = kept;
        state
            .canceled
            .extend(canceled.into_iter().map(|wait| wait.callback));

        if let Some(live) = state.live.get_mut(&self.fd) {
            *live -= 1;
            if *live == 0 {
                state.live.remove(&self.fd);
            }
        }
        state.released.push(self.fd);
    }
}

struct ManualTimer {
    id: u64,
    state: Arc<Mutex<ManualState>>,
}

impl DeadlineTimer for ManualTimer {
    fn now(&self) -> Instant {
        self.state.lock().now
    }

    fn arm(&self, deadline: Instant, on_fire: WaitCallback) {
        let mut state = self.state.lock();
        state.cancel_timer(self.id);
        state.timer_arms += 1;
        state.timers.push(TimerWait {
            timer: self.id,
            deadline,
            callback: on_fire,
        });
    }

    fn cancel(&self) {
        self.state.lock().cancel_timer(self.id);
    }
}

impl Drop for ManualTimer {
    fn drop(&mut self) {
        self.state.lock().cancel_timer(self.id);
    }
}
