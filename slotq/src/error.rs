//! Error types for queue creation and message transfer.

use thiserror::Error;

use crate::config::ConfigError;
use crate::notify::NotifyError;

/// Result alias for queue operations.
pub type Result<T> = std::result::Result<T, MqError>;

/// Resource that could not be obtained while creating a queue.
#[derive(Debug, Error)]
pub enum AllocError {
    /// The slot buffer could not be reserved.
    #[error("slot buffer of {bytes} bytes")]
    Slots { bytes: usize },
    /// The notification descriptor could not be created.
    #[error("notifier: {0}")]
    Notifier(#[source] NotifyError),
}

/// Failures reported by [`Registry`](crate::Registry) and [`Queue`](crate::Queue).
///
/// None of these are fatal and none are retried internally; the queue is left
/// exactly as it was before the failed call.
#[derive(Debug, Error)]
pub enum MqError {
    /// The handle does not name a live queue (never created, or destroyed).
    #[error("handle does not refer to a live queue")]
    InvalidHandle,
    /// The supplied configuration cannot describe a queue.
    #[error("invalid queue configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    /// Creating the queue failed to obtain a resource.
    #[error("allocation failure: {0}")]
    AllocationFailure(#[from] AllocError),
    /// Every slot is occupied.
    #[error("queue full")]
    QueueFull,
    /// The message does not fit in one slot.
    #[error("message of {size} bytes exceeds slot payload capacity of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },
    /// No message is pending.
    #[error("queue empty")]
    QueueEmpty,
    /// The caller's buffer cannot hold the oldest message; it stays queued.
    #[error("buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },
    /// The readiness counter could not be signalled or consumed.
    #[error("notification failure: {0}")]
    Notification(#[source] NotifyError),
    /// [`Registry::pop_timeout`](crate::Registry::pop_timeout) ran out of time.
    #[error("timed out waiting for a message")]
    Timeout,
}
