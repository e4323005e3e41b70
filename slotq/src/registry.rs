//! Handle-to-queue table and the operation surface built on it.
//!
//! # Locking
//!
//! Two levels: the table mutex guards only membership, and each queue has its
//! own mutex for ring state and counter.
//!
//! - `push`/`pop` hold the table lock just long enough to resolve the handle
//!   and take the queue lock, then release it before touching the ring.
//! - `destroy` holds the table lock for the whole teardown (resolve, take the
//!   queue lock, unlink), so no lookup can observe a queue that is going away.
//!
//! No path ever holds two queue locks, so queues cannot deadlock each other.
//!
//! # Example
//!
//! ```
//! use slotq::{QueueConfig, Registry};
//!
//! let registry = Registry::new();
//! let handle = registry.create(Some(&QueueConfig::new(2, 16)))?;
//!
//! registry.push(&handle, b"ab")?;
//! let mut buf = [0u8; 16];
//! let len = registry.pop(&handle, &mut buf)?;
//! assert_eq!(&buf[..len], b"ab");
//!
//! registry.destroy(&handle)?;
//! # Ok::<(), slotq::MqError>(())
//! ```

use std::collections::HashMap;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use minstant::Instant;

use crate::config::QueueConfig;
use crate::error::{AllocError, MqError, Result};
use crate::handle::Handle;
use crate::notify::{EventFd, Notify, duplicate, wait_readable};
use crate::queue::{Queue, QueueGuard};
use crate::trace::{debug, error, warn};

/// Longest single park in [`Registry::pop_timeout`] before the handle is
/// re-resolved.
const MAX_WAIT_SLICE: Duration = Duration::from_millis(50);

/// Timeout specification for [`Registry::pop_timeout`].
#[derive(Debug, Clone, Copy)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

struct Entry<N: Notify> {
    /// The handle issued for this queue; its descriptor is the table key.
    handle: Handle,
    queue: Arc<Queue<N>>,
}

type Table<N> = HashMap<RawFd, Entry<N>>;

/// Live queues, keyed by their handle descriptor.
///
/// Queues are created and destroyed only through the registry; dropping the
/// registry releases every queue still in it.
pub struct Registry<N: Notify = EventFd> {
    queues: Mutex<Table<N>>,
}

impl Default for Registry<EventFd> {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry<EventFd> {
    /// Creates an empty registry of eventfd-backed queues.
    #[must_use]
    pub fn new() -> Self {
        Self::with_notifier()
    }
}

impl<N: Notify> Registry<N> {
    /// Creates an empty registry whose queues use notifier `N`.
    #[must_use]
    pub fn with_notifier() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// The table holds no invariant a panicking holder could break halfway.
    fn table(&self) -> MutexGuard<'_, Table<N>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve<'t>(table: &'t Table<N>, handle: &Handle) -> Option<&'t Arc<Queue<N>>> {
        table
            .get(&handle.as_raw_fd())
            .filter(|entry| entry.handle.same_queue(handle))
            .map(|entry| &entry.queue)
    }

    /// Resolves `handle` and runs `op` under that queue's lock.
    ///
    /// The queue lock is taken before the table lock is released.
    fn with_queue<R>(
        &self,
        handle: &Handle,
        op: impl FnOnce(&mut QueueGuard<'_, N>) -> R,
    ) -> Result<R> {
        let table = self.table();
        let Some(queue) = Self::resolve(&table, handle).map(Arc::clone) else {
            error!(%handle, "mq provided is not valid");
            return Err(MqError::InvalidHandle);
        };
        let mut guard = queue.lock();
        drop(table);
        Ok(op(&mut guard))
    }

    /// Creates a queue and returns its handle.
    ///
    /// `None` selects [`QueueConfig::default`] (10 slots of 128 bytes).
    ///
    /// # Errors
    ///
    /// Returns [`MqError::InvalidConfig`] or [`MqError::AllocationFailure`];
    /// nothing is registered on failure.
    pub fn create(&self, config: Option<&QueueConfig>) -> Result<Handle> {
        let config = config.copied().unwrap_or_else(|| {
            debug!("using default queue configuration");
            QueueConfig::default()
        });

        let queue = match Queue::<N>::new(&config) {
            Ok(queue) => queue,
            Err(e) => {
                error!(error = %e, "failed to create mq");
                return Err(e);
            }
        };
        let fd = match duplicate(queue.as_fd()) {
            Ok(fd) => fd,
            Err(e) => {
                error!(error = %e, "failed to create mq handle");
                return Err(AllocError::Notifier(e).into());
            }
        };
        let handle = Handle::new(fd);

        // The handle's descriptor is open, so no live entry can hold the same number.
        self.table().insert(
            handle.as_raw_fd(),
            Entry {
                handle: handle.clone(),
                queue: Arc::new(queue),
            },
        );
        debug!(
            %handle,
            max_msg = config.max_msg,
            max_msg_size = config.max_msg_size,
            "mq created"
        );
        Ok(handle)
    }

    /// Appends a message to the queue named by `handle`.
    ///
    /// # Errors
    ///
    /// [`MqError::InvalidHandle`], [`MqError::QueueFull`],
    /// [`MqError::MessageTooLarge`] or [`MqError::Notification`]. The queue is
    /// unchanged on every error.
    pub fn push(&self, handle: &Handle, msg: &[u8]) -> Result<()> {
        self.with_queue(handle, |queue| queue.push(msg))?
    }

    /// Removes the oldest message into `buf` and returns its length.
    ///
    /// # Errors
    ///
    /// [`MqError::InvalidHandle`], [`MqError::QueueEmpty`],
    /// [`MqError::BufferTooSmall`] or [`MqError::Notification`]. The message
    /// stays queued on every error.
    pub fn pop(&self, handle: &Handle, buf: &mut [u8]) -> Result<usize> {
        self.with_queue(handle, |queue| queue.pop(buf))?
    }

    /// Pops, parking on the handle's descriptor while the queue is empty.
    ///
    /// Every attempt re-resolves the handle, so a concurrent [`destroy`]
    /// ends the wait with [`MqError::InvalidHandle`] within one wait slice.
    /// A duration too large to form a deadline waits like [`Timeout::Infinite`].
    ///
    /// # Errors
    ///
    /// [`MqError::Timeout`] if no message arrives in time, otherwise the
    /// errors of [`pop`].
    ///
    /// [`destroy`]: Self::destroy
    /// [`pop`]: Self::pop
    pub fn pop_timeout(&self, handle: &Handle, buf: &mut [u8], timeout: Timeout) -> Result<usize> {
        let deadline = match timeout {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Instant::now().checked_add(d),
        };
        loop {
            match self.pop(handle, buf) {
                Err(MqError::QueueEmpty) => {}
                other => return other,
            }

            let slice = match deadline {
                None => MAX_WAIT_SLICE,
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        return Err(MqError::Timeout);
                    }
                    (dl - now).min(MAX_WAIT_SLICE)
                }
            };

            // The handle's own descriptor shares the queue's counter.
            wait_readable(handle.as_fd(), slice).map_err(|e| {
                warn!(%handle, error = %e, "wait for readiness failed");
                MqError::Notification(e)
            })?;
        }
    }

    /// Number of pending messages in the queue named by `handle`.
    ///
    /// # Errors
    ///
    /// [`MqError::InvalidHandle`] if the queue does not exist.
    pub fn len(&self, handle: &Handle) -> Result<usize> {
        self.with_queue(handle, |queue| queue.len())
    }

    /// Whether `handle` names a live queue.
    #[must_use]
    pub fn contains(&self, handle: &Handle) -> bool {
        Self::resolve(&self.table(), handle).is_some()
    }

    /// Number of live queues.
    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.table().len()
    }

    /// Unregisters the queue and releases its slots, lock and descriptor.
    ///
    /// Waits for any in-flight `push`/`pop` on the queue to finish first.
    /// Outstanding handles keep their own descriptor open, so its number is
    /// not reused until the last clone is dropped.
    ///
    /// # Errors
    ///
    /// [`MqError::InvalidHandle`] if the queue does not exist (including a
    /// second destroy of the same handle). The registry is left unchanged.
    pub fn destroy(&self, handle: &Handle) -> Result<()> {
        let mut table = self.table();
        let Some(queue) = Self::resolve(&table, handle).map(Arc::clone) else {
            error!(%handle, "mq provided is not valid");
            return Err(MqError::InvalidHandle);
        };

        let guard = queue.lock();
        table.remove(&handle.as_raw_fd());
        drop(guard);
        // A push/pop that took the queue lock before us may still hold a
        // reference; the queue is freed when the last one goes.
        drop(queue);
        drop(table);

        debug!(%handle, "mq destroyed");
        Ok(())
    }
}

impl<N: Notify> Drop for Registry<N> {
    fn drop(&mut self) {
        let live = self.table().len();
        if live > 0 {
            debug!(live, "releasing queues still registered");
        }
    }
}
