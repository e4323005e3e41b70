//! Queue configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::PREFIX_LEN;

/// Slot count used when no configuration is supplied.
pub const DEFAULT_MAX_MSG: u8 = 10;

/// Payload capacity (bytes) used when no configuration is supplied.
pub const DEFAULT_MAX_MSG_SIZE: usize = 128;

/// Rejected configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A queue needs at least one slot.
    #[error("max_msg must be at least 1")]
    ZeroCapacity,
    /// Payload capacity plus the size prefix does not fit in `usize`.
    #[error("max_msg_size {0} overflows the slot size")]
    SlotSizeOverflow(usize),
}

/// Shape of a queue: how many slots and how large each payload may be.
///
/// `max_msg_size` is the payload capacity; every slot additionally carries a
/// [`PREFIX_LEN`]-byte length header, so the effective slot size is
/// `max_msg_size + PREFIX_LEN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of slots (1..=255).
    pub max_msg: u8,
    /// Largest payload a single message may carry, in bytes.
    pub max_msg_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_msg: DEFAULT_MAX_MSG,
            max_msg_size: DEFAULT_MAX_MSG_SIZE,
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub const fn new(max_msg: u8, max_msg_size: usize) -> Self {
        Self {
            max_msg,
            max_msg_size,
        }
    }

    #[must_use]
    pub const fn with_max_msg(mut self, max_msg: u8) -> Self {
        self.max_msg = max_msg;
        self
    }

    #[must_use]
    pub const fn with_max_msg_size(mut self, max_msg_size: usize) -> Self {
        self.max_msg_size = max_msg_size;
        self
    }

    /// Bytes per slot including the length prefix, or `None` on overflow.
    #[must_use]
    pub const fn slot_size(&self) -> Option<usize> {
        self.max_msg_size.checked_add(PREFIX_LEN)
    }

    /// Checks that the configuration describes a usable queue.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if there are no slots or the slot size overflows.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.max_msg == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.slot_size().is_none() {
            return Err(ConfigError::SlotSizeOverflow(self.max_msg_size));
        }
        Ok(())
    }
}
