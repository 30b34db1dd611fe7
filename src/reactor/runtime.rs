//! Tokio-backed reactor.
//!
//! Readiness waits are tasks on a tokio runtime awaiting an [`AsyncFd`], and
//! timers are tasks awaiting [`sleep_until`]. Every wait races a oneshot
//! cancellation channel, so cancelling, re-arming or dropping the owner
//! delivers [`Error::Canceled`] to the pending callback.
//!
//! # Descriptor Lifecycle
//!
//! The engine's descriptor is registered as is and never closed here. Dropping
//! a registration deregisters it from the I/O driver before `drop` returns,
//! even while wait tasks are still winding down, so the engine may close the
//! descriptor or reuse its number right away.
//!
//! # Readiness Probe
//!
//! tokio caches readiness until it is cleared. Because the engine performs its
//! own I/O, the adapter cannot observe `WouldBlock`. Instead each wake-up is
//! confirmed with a zero-timeout `poll(2)` probe. Stale readiness is cleared
//! and the wait continues, so a wait completes only while the descriptor is
//! actually ready.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::poll_fn;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use parking_lot::Mutex;
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::handler::ReactorOptions;
use crate::protocol::Direction;

use super::{DeadlineTimer, Reactor, Registration, WaitCallback};

// ============================================================================
// Types
// ============================================================================

/// Cancellation slot of one outstanding wait. Dropping the sender cancels it.
type CancelSlot = Mutex<Option<oneshot::Sender<()>>>;

// ============================================================================
// TokioReactor
// ============================================================================

/// [`Reactor`] running every wait as a task on a tokio runtime.
///
/// Works with both the current-thread and the multi-thread scheduler.
/// Callbacks run on whichever worker polls the wait task.
#[derive(Clone)]
pub struct TokioReactor {
    /// Runtime the wait tasks are spawned on.
    runtime: Handle,
    /// Registration behavior.
    options: ReactorOptions,
}

impl TokioReactor {
    /// Creates a reactor on the runtime of the calling context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if called outside a tokio runtime.
    pub fn new() -> Result<Self> {
        Self::with_options(ReactorOptions::default())
    }

    /// Creates a reactor on the current runtime with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if called outside a tokio runtime.
    pub fn with_options(options: ReactorOptions) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::config(format!("No tokio runtime in context: {e}")))?;
        Ok(Self::with_handle(runtime, options))
    }

    /// Creates a reactor on the given runtime.
    #[inline]
    #[must_use]
    pub fn with_handle(runtime: Handle, options: ReactorOptions) -> Self {
        Self { runtime, options }
    }

    /// Returns the runtime waits are spawned on.
    #[inline]
    #[must_use]
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Returns the registration options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ReactorOptions {
        &self.options
    }
}

impl fmt::Debug for TokioReactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioReactor")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Reactor for TokioReactor {
    fn register(&self, fd: RawFd) -> Result<Box<dyn Registration>> {
        let registration = TokioRegistration::new(&self.runtime, fd, &self.options)
            .map_err(|e| Error::registration(fd, e))?;

        debug!(fd, "Descriptor registered");

        Ok(Box::new(registration))
    }

    fn timer(&self) -> Box<dyn DeadlineTimer> {
        Box::new(TokioTimer {
            runtime: self.runtime.clone(),
            slot: Mutex::new(None),
        })
    }
}

// ============================================================================
// TokioRegistration
// ============================================================================

/// Engine descriptor as seen by the I/O driver. Never closes it.
#[derive(Debug, Clone, Copy)]
struct EngineFd(RawFd);

impl AsRawFd for EngineFd {
    #[inline]
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// Driver registration shared with the wait tasks. `None` once released.
type SharedIo = Arc<Mutex<Option<AsyncFd<EngineFd>>>>;

/// Readiness registration of one engine descriptor.
struct TokioRegistration {
    /// Engine descriptor.
    fd: RawFd,
    /// Driver registration, taken out and dropped on release.
    io: SharedIo,
    /// Runtime wait tasks are spawned on.
    runtime: Handle,
    /// Outstanding read wait.
    read: CancelSlot,
    /// Outstanding write wait.
    write: CancelSlot,
}

impl TokioRegistration {
    fn new(runtime: &Handle, fd: RawFd, options: &ReactorOptions) -> io::Result<Self> {
        if fd < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "negative descriptor",
            ));
        }

        if options.nonblocking {
            set_nonblocking(fd)?;
        }

        let _enter = runtime.enter();
        let io = AsyncFd::with_interest(EngineFd(fd), Interest::READABLE | Interest::WRITABLE)?;

        Ok(Self {
            fd,
            io: Arc::new(Mutex::new(Some(io))),
            runtime: runtime.clone(),
            read: Mutex::new(None),
            write: Mutex::new(None),
        })
    }

    #[inline]
    fn slot(&self, direction: Direction) -> &CancelSlot {
        match direction {
            Direction::Read => &self.read,
            Direction::Write => &self.write,
        }
    }
}

impl Registration for TokioRegistration {
    fn arm(&self, direction: Direction, on_ready: WaitCallback) {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        // Install the new slot before spawning so a fast completion that
        // re-arms from its callback cannot be overwritten by this one.
        let stale = self.slot(direction).lock().replace(cancel_tx);
        drop(stale);

        let io = Arc::clone(&self.io);
        let fd = self.fd;

        self.runtime.spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel_rx => Err(Error::Canceled),
                ready = poll_fn(|cx| poll_shared(&io, direction, cx)) => ready,
            };

            trace!(fd, %direction, ok = outcome.is_ok(), "Readiness wait completed");
            on_ready(outcome);
        });

        trace!(fd, %direction, "Readiness wait armed");
    }
}

impl Drop for TokioRegistration {
    fn drop(&mut self) {
        let read = self.read.lock().take();
        let write = self.write.lock().take();
        drop((read, write));

        // Deregisters now. Tasks that poll afterwards see `None`.
        let io = self.io.lock().take();
        drop(io);

        trace!(fd = self.fd, "Registration released");
    }
}

/// Polls the shared registration, or reports cancellation once released.
fn poll_shared(io: &SharedIo, direction: Direction, cx: &mut Context<'_>) -> Poll<Result<()>> {
    match io.lock().as_ref() {
        Some(io) => poll_ready(io, direction, cx),
        None => Poll::Ready(Err(Error::Canceled)),
    }
}

/// Polls until `io` is ready in `direction` according to a live probe.
fn poll_ready(
    io: &AsyncFd<EngineFd>,
    direction: Direction,
    cx: &mut Context<'_>,
) -> Poll<Result<()>> {
    loop {
        let mut guard = match direction {
            Direction::Read => ready!(io.poll_read_ready(cx))?,
            Direction::Write => ready!(io.poll_write_ready(cx))?,
        };

        if probe(io.as_raw_fd(), direction)? {
            return Poll::Ready(Ok(()));
        }

        guard.clear_ready();
    }
}

/// Zero-timeout readiness probe. Error and hang-up conditions count as ready
/// so the engine gets to observe them.
fn probe(fd: RawFd, direction: Direction) -> io::Result<bool> {
    let events = match direction {
        Direction::Read => libc::POLLIN,
        Direction::Write => libc::POLLOUT,
    };
    let mut pollfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };

    loop {
        // SAFETY: `pollfd` is one valid entry that outlives the call.
        let rc = unsafe { libc::poll(&mut pollfd, 1, 0) };
        if rc >= 0 {
            return Ok(pollfd.revents != 0);
        }

        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Switches the open file description behind `fd` to non-blocking mode.
fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: `fd` is an open descriptor owned by the caller.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    if flags & libc::O_NONBLOCK == 0 {
        // SAFETY: as above.
        let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(())
}

// ============================================================================
// TokioTimer
// ============================================================================

/// Deadline timer backed by [`sleep_until`].
struct TokioTimer {
    runtime: Handle,
    slot: CancelSlot,
}

impl DeadlineTimer for TokioTimer {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn arm(&self, deadline: Instant, on_fire: WaitCallback) {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let stale = self.slot.lock().replace(cancel_tx);
        drop(stale);

        self.runtime.spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel_rx => Err(Error::Canceled),
                () = sleep_until(deadline) => Ok(()),
            };
            on_fire(outcome);
        });
    }

    fn cancel(&self) {
        if self.slot.lock().take().is_some() {
            trace!("Timer wait cancelled");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
