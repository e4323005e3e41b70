//! Counting readiness signal backing every queue.
//!
//! A [`Notify`] implementation holds a single integer counter behind an OS
//! descriptor. The descriptor polls readable exactly while the counter is
//! non-zero, so a consumer can park on it with `poll`, `epoll` or [`mio`]
//! and call [`Registry::pop`](crate::Registry::pop) once it fires.
//!
//! # Contract
//!
//! - `signal(n)` adds `n` to the counter and never blocks.
//! - `consume_one()` subtracts exactly one; on a zero counter it fails with
//!   [`NotifyError::Empty`] instead of waiting.
//! - The queue keeps the counter equal to its occupancy, so both calls are
//!   only made while the queue lock is held.
//!
//! [`EventFd`] is the Linux implementation: an `eventfd(2)` in semaphore mode.

use std::num::NonZeroU64;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::time::Duration;

use rustix::event::{EventfdFlags, PollFd, PollFlags, eventfd, poll};
use rustix::io::{self, Errno};
use thiserror::Error;

/// Width of one eventfd transfer.
const COUNTER_LEN: usize = size_of::<u64>();

/// Failures of the readiness counter.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The descriptor could not be created.
    #[error("failed to create eventfd: {0}")]
    Open(#[source] Errno),
    /// Adding to the counter failed (e.g. it would overflow).
    #[error("failed to signal eventfd: {0}")]
    Signal(#[source] Errno),
    /// Reading from the counter failed.
    #[error("failed to consume eventfd: {0}")]
    Consume(#[source] Errno),
    /// The counter was already zero.
    #[error("notification counter is empty")]
    Empty,
    /// The kernel moved fewer than eight bytes.
    #[error("short {op} on eventfd: {len} of 8 bytes")]
    ShortTransfer { op: &'static str, len: usize },
    /// The descriptor could not be duplicated for a handle.
    #[error("failed to duplicate eventfd: {0}")]
    Duplicate(#[source] Errno),
    /// Waiting for readability failed.
    #[error("failed to poll eventfd: {0}")]
    Poll(#[source] Errno),
}

/// A counting, pollable readiness signal.
pub trait Notify: AsFd + Send + Sync + Sized {
    /// Creates a notifier with a zero counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying OS resource cannot be obtained.
    fn open() -> Result<Self, NotifyError>;

    /// Adds `n` to the counter, making the descriptor readable.
    ///
    /// # Errors
    ///
    /// Returns an error if the increment cannot be delivered; the counter is
    /// then unchanged.
    fn signal(&self, n: NonZeroU64) -> Result<(), NotifyError>;

    /// Subtracts one from the counter without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Empty`] if the counter is zero, or another
    /// variant if the descriptor cannot be read.
    fn consume_one(&self) -> Result<(), NotifyError>;
}

/// Non-blocking `eventfd` in semaphore mode.
///
/// Each read returns 1 and decrements the counter by one, which is exactly
/// `consume_one`. The descriptor is closed on drop.
#[derive(Debug)]
pub struct EventFd {
    fd: OwnedFd,
}

impl Notify for EventFd {
    fn open() -> Result<Self, NotifyError> {
        let flags = EventfdFlags::NONBLOCK | EventfdFlags::CLOEXEC | EventfdFlags::SEMAPHORE;
        let fd = eventfd(0, flags).map_err(NotifyError::Open)?;
        Ok(Self { fd })
    }

    fn signal(&self, n: NonZeroU64) -> Result<(), NotifyError> {
        let written = io::write(&self.fd, &n.get().to_ne_bytes()).map_err(NotifyError::Signal)?;
        if written == COUNTER_LEN {
            Ok(())
        } else {
            Err(NotifyError::ShortTransfer {
                op: "write",
                len: written,
            })
        }
    }

    fn consume_one(&self) -> Result<(), NotifyError> {
        let mut buf = [0u8; COUNTER_LEN];
        match io::read(&self.fd, &mut buf) {
            Ok(COUNTER_LEN) => Ok(()),
            Ok(len) => Err(NotifyError::ShortTransfer { op: "read", len }),
            Err(Errno::AGAIN) => Err(NotifyError::Empty),
            Err(e) => Err(NotifyError::Consume(e)),
        }
    }
}

impl AsFd for EventFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for EventFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Duplicates `fd` with close-on-exec set.
///
/// The copy shares the counter with the original and keeps it alive after the
/// original is closed.
///
/// # Errors
///
/// Returns [`NotifyError::Duplicate`] if the process is out of descriptors.
pub fn duplicate(fd: BorrowedFd<'_>) -> Result<OwnedFd, NotifyError> {
    io::fcntl_dupfd_cloexec(fd, 0).map_err(NotifyError::Duplicate)
}

/// Waits up to `timeout` for `fd` to poll readable.
///
/// Returns `Ok(false)` on timeout or signal interruption.
///
/// # Errors
///
/// Returns [`NotifyError::Poll`] if `poll(2)` fails.
pub fn wait_readable(fd: BorrowedFd<'_>, timeout: Duration) -> Result<bool, NotifyError> {
    // Round sub-millisecond waits up so a short timeout still parks once.
    let millis = timeout.as_micros().div_ceil(1000);
    let millis = i32::try_from(millis).unwrap_or(i32::MAX);
    let mut fds = [PollFd::new(&fd, PollFlags::IN)];
    match poll(&mut fds, millis) {
        Ok(ready) => Ok(ready > 0 && fds[0].revents().contains(PollFlags::IN)),
        Err(Errno::INTR) => Ok(false),
        Err(e) => Err(NotifyError::Poll(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readable(n: &EventFd) -> bool {
        wait_readable(n.as_fd(), Duration::ZERO).unwrap()
    }

    #[test]
    fn fresh_notifier_is_not_readable() {
        let n = EventFd::open().unwrap();
        assert!(!readable(&n));
        assert!(matches!(n.consume_one(), Err(NotifyError::Empty)));
    }

    #[test]
    fn consume_one_drains_exactly_signalled_count() {
        let n = EventFd::open().unwrap();
        n.signal(NonZeroU64::new(3).unwrap()).unwrap();
        assert!(readable(&n));

        for _ in 0..3 {
            n.consume_one().unwrap();
        }
        assert!(!readable(&n));
        assert!(matches!(n.consume_one(), Err(NotifyError::Empty)));
    }

    #[test]
    fn readable_until_last_unit_consumed() {
        let n = EventFd::open().unwrap();
        n.signal(NonZeroU64::MIN).unwrap();
        n.signal(NonZeroU64::MIN).unwrap();

        n.consume_one().unwrap();
        assert!(readable(&n));
        n.consume_one().unwrap();
        assert!(!readable(&n));
    }

    #[test]
    fn signal_past_counter_limit_fails_without_blocking() {
        let n = EventFd::open().unwrap();
        // The kernel caps the counter at u64::MAX - 1.
        n.signal(NonZeroU64::new(u64::MAX - 1).unwrap()).unwrap();
        assert!(matches!(
            n.signal(NonZeroU64::MIN),
            Err(NotifyError::Signal(Errno::AGAIN))
        ));
        n.consume_one().unwrap();
    }

    #[test]
    fn duplicate_shares_counter_and_outlives_original() {
        let n = EventFd::open().unwrap();
        let copy = duplicate(n.as_fd()).unwrap();
        assert_ne!(copy.as_raw_fd(), n.as_raw_fd());

        n.signal(NonZeroU64::MIN).unwrap();
        assert!(wait_readable(copy.as_fd(), Duration::ZERO).unwrap());
        n.consume_one().unwrap();
        assert!(!wait_readable(copy.as_fd(), Duration::ZERO).unwrap());

        drop(n);
        assert!(!wait_readable(copy.as_fd(), Duration::ZERO).unwrap());
    }

    #[test]
    fn wait_readable_times_out_on_empty_counter() {
        let n = EventFd::open().unwrap();
        let start = std::time::Instant::now();
        assert!(!wait_readable(n.as_fd(), Duration::from_millis(20)).unwrap());
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn wait_readable_wakes_on_signal_from_other_thread() {
        let n = std::sync::Arc::new(EventFd::open().unwrap());
        let signaller = std::sync::Arc::clone(&n);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            signaller.signal(NonZeroU64::MIN).unwrap();
        });

        assert!(wait_readable(n.as_fd(), Duration::from_secs(5)).unwrap());
        handle.join().unwrap();
        n.consume_one().unwrap();
    }
}
