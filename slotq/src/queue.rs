//! Fixed-slot ring buffer of length-prefixed byte messages.
//!
//! A [`Queue`] owns `max_msg` slots of `max_msg_size + PREFIX_LEN` bytes each,
//! laid out contiguously:
//!
//! ```text
//! ┌──────────────┬───────────────────────┐
//! │ len (u64 LE) │ payload[..max_msg_size]│  slot 0
//! ├──────────────┼───────────────────────┤
//! │ len (u64 LE) │ payload[..max_msg_size]│  slot 1
//! ├──────────────┴───────────────────────┤
//! │ ...                                  │
//! └──────────────────────────────────────┘
//! ```
//!
//! All state sits behind one mutex together with the [`Notify`] counter, and
//! the counter always equals the number of occupied slots. Push writes the
//! slot first and only advances the cursor once the signal is delivered; pop
//! consumes the signal before advancing. A failed call therefore leaves the
//! queue exactly as it found it.

use std::num::NonZeroU64;
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::QueueConfig;
use crate::error::{AllocError, MqError, Result};
use crate::notify::{EventFd, Notify};
use crate::trace::{debug, error};

/// Width of the per-slot length header.
pub const PREFIX_LEN: usize = size_of::<u64>();

/// Slot storage and cursors. Only touched through a [`QueueGuard`].
struct Ring {
    slots: Box<[u8]>,
    slot_size: usize,
    capacity: usize,
    push_index: usize,
    pop_index: usize,
    occupancy: usize,
}

impl Ring {
    fn with_config(config: &QueueConfig) -> Result<Self> {
        config.validate()?;
        let capacity = usize::from(config.max_msg);
        let slot_size = config.max_msg_size + PREFIX_LEN;
        let bytes = capacity
            .checked_mul(slot_size)
            .ok_or(AllocError::Slots { bytes: usize::MAX })?;

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(bytes)
            .map_err(|_| AllocError::Slots { bytes })?;
        slots.resize(bytes, 0);

        Ok(Self {
            slots: slots.into_boxed_slice(),
            slot_size,
            capacity,
            push_index: 0,
            pop_index: 0,
            occupancy: 0,
        })
    }

    /// Advances a cursor to the next slot, wrapping to 0 at capacity.
    #[inline]
    const fn bump_cursor(&self, cursor: usize) -> usize {
        let next = cursor + 1;
        if next == self.capacity { 0 } else { next }
    }

    #[inline]
    const fn max_payload(&self) -> usize {
        self.slot_size - PREFIX_LEN
    }

    #[inline]
    fn slot(&self, index: usize) -> &[u8] {
        let start = index * self.slot_size;
        &self.slots[start..start + self.slot_size]
    }

    #[inline]
    fn slot_mut(&mut self, index: usize) -> &mut [u8] {
        let start = index * self.slot_size;
        &mut self.slots[start..start + self.slot_size]
    }
}

/// Reads the length header of a slot.
#[inline]
fn stored_len(slot: &[u8]) -> usize {
    let mut raw = [0u8; PREFIX_LEN];
    raw.copy_from_slice(&slot[..PREFIX_LEN]);
    // Headers are only ever written from a `usize` on this same target.
    #[allow(clippy::cast_possible_truncation)]
    let len = u64::from_le_bytes(raw) as usize;
    len
}

/// A bounded FIFO of byte messages with a pollable readiness counter.
///
/// The queue is usable on its own, but is normally owned by a
/// [`Registry`](crate::Registry) and reached through a [`Handle`](crate::Handle).
pub struct Queue<N: Notify = EventFd> {
    ring: Mutex<Ring>,
    notifier: N,
}

impl<N: Notify> Queue<N> {
    /// Allocates a zeroed slot buffer and a fresh notifier.
    ///
    /// # Errors
    ///
    /// Returns [`MqError::InvalidConfig`] for an unusable configuration and
    /// [`MqError::AllocationFailure`] if the buffer or the notifier cannot be
    /// obtained. Nothing is leaked on failure.
    pub fn new(config: &QueueConfig) -> Result<Self> {
        let ring = Ring::with_config(config)?;
        let notifier = N::open().map_err(AllocError::Notifier)?;
        Ok(Self {
            ring: Mutex::new(ring),
            notifier,
        })
    }

    /// Acquires the queue lock.
    ///
    /// A panic in another holder cannot leave the ring inconsistent (every
    /// mutation commits after its last fallible step), so poisoning is ignored.
    pub fn lock(&self) -> QueueGuard<'_, N> {
        QueueGuard {
            ring: self.ring.lock().unwrap_or_else(PoisonError::into_inner),
            notifier: &self.notifier,
        }
    }

    /// Locks and pushes. See [`QueueGuard::push`].
    ///
    /// # Errors
    ///
    /// See [`QueueGuard::push`].
    pub fn push(&self, msg: &[u8]) -> Result<()> {
        self.lock().push(msg)
    }

    /// Locks and pops. See [`QueueGuard::pop`].
    ///
    /// # Errors
    ///
    /// See [`QueueGuard::pop`].
    pub fn pop(&self, buf: &mut [u8]) -> Result<usize> {
        self.lock().pop(buf)
    }
}

/// The notifier's descriptor, readable while messages are pending.
///
/// Only the pollable view is exposed; the counter itself moves under the
/// queue lock.
impl<N: Notify> AsFd for Queue<N> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.notifier.as_fd()
    }
}

/// Exclusive access to a queue's ring and counter.
pub struct QueueGuard<'a, N: Notify> {
    ring: MutexGuard<'a, Ring>,
    notifier: &'a N,
}

impl<N: Notify> QueueGuard<'_, N> {
    /// Appends `msg` at the tail.
    ///
    /// # Errors
    ///
    /// - [`MqError::QueueFull`] if every slot is occupied.
    /// - [`MqError::MessageTooLarge`] if `msg` exceeds the payload capacity.
    /// - [`MqError::Notification`] if the counter cannot be signalled; the
    ///   message is then not enqueued.
    pub fn push(&mut self, msg: &[u8]) -> Result<()> {
        let ring = &mut *self.ring;
        if ring.occupancy >= ring.capacity {
            debug!(capacity = ring.capacity, "mq full");
            return Err(MqError::QueueFull);
        }
        let max = ring.max_payload();
        if msg.len() > max {
            error!(size = msg.len(), max, "message too large");
            return Err(MqError::MessageTooLarge {
                size: msg.len(),
                max,
            });
        }

        let index = ring.push_index;
        let slot = ring.slot_mut(index);
        let (header, payload) = slot.split_at_mut(PREFIX_LEN);
        header.copy_from_slice(&(msg.len() as u64).to_le_bytes());
        payload[..msg.len()].copy_from_slice(msg);

        // Slot bytes are invisible until the cursor moves, so a failed signal
        // leaves nothing to roll back.
        if let Err(e) = self.notifier.signal(NonZeroU64::MIN) {
            error!(error = %e, "failed to signal notifier");
            return Err(MqError::Notification(e));
        }

        ring.push_index = ring.bump_cursor(index);
        ring.occupancy += 1;
        Ok(())
    }

    /// Removes the oldest message, copying it into the front of `buf`.
    ///
    /// Returns the message length; `Ok(0)` is a valid zero-length message.
    ///
    /// # Errors
    ///
    /// - [`MqError::QueueEmpty`] if nothing is pending.
    /// - [`MqError::BufferTooSmall`] if `buf` is shorter than the message; the
    ///   message stays queued for a retry.
    /// - [`MqError::Notification`] if the counter cannot be consumed; the
    ///   message stays queued.
    pub fn pop(&mut self, buf: &mut [u8]) -> Result<usize> {
        let ring = &mut *self.ring;
        if ring.occupancy == 0 {
            debug!("mq empty");
            return Err(MqError::QueueEmpty);
        }

        let index = ring.pop_index;
        let slot = ring.slot(index);
        let len = stored_len(slot);
        if buf.len() < len {
            error!(need = len, have = buf.len(), "message buffer too small");
            return Err(MqError::BufferTooSmall {
                need: len,
                have: buf.len(),
            });
        }

        if let Err(e) = self.notifier.consume_one() {
            error!(error = %e, "failed to consume notifier");
            return Err(MqError::Notification(e));
        }

        buf[..len].copy_from_slice(&slot[PREFIX_LEN..PREFIX_LEN + len]);
        ring.pop_index = ring.bump_cursor(index);
        ring.occupancy -= 1;
        Ok(len)
    }

    /// Number of pending messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.occupancy
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.occupancy == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.ring.occupancy == self.ring.capacity
    }

    /// Slot count.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity
    }

    /// Largest message a slot can hold.
    #[must_use]
    pub fn max_payload(&self) -> usize {
        self.ring.max_payload()
    }

    /// Length of the oldest pending message, without removing it.
    #[must_use]
    pub fn peek_len(&self) -> Option<usize> {
        (self.ring.occupancy > 0).then(|| stored_len(self.ring.slot(self.ring.pop_index)))
    }
}
