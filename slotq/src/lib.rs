//! Bounded, fixed-slot byte message queues with pollable readiness.
//!
//! A producer pushes variable-length byte messages into a ring of fixed-size
//! slots; a consumer pops them in arrival order. Each queue carries an
//! `eventfd` whose counter equals the number of pending messages, so its
//! [`Handle`] can be handed to `poll`/`epoll`/[`mio`] to wait for data.
//!
//! - [`Registry`] - owns queues and exposes `create`/`push`/`pop`/`destroy`
//! - [`Queue`] - the ring buffer itself, usable without a registry
//! - [`Notify`] / [`EventFd`] - the counting readiness signal
//!
//! Every operation is non-blocking: a full queue, an empty queue or an
//! undersized buffer is reported immediately and leaves the queue unchanged.

pub mod config;
pub mod error;
pub mod handle;
pub mod notify;
pub mod queue;
pub mod registry;
mod trace;

pub use config::{ConfigError, QueueConfig};
pub use error::{AllocError, MqError, Result};
pub use handle::Handle;
pub use notify::{EventFd, Notify, NotifyError};
pub use queue::{PREFIX_LEN, Queue, QueueGuard};
pub use registry::{Registry, Timeout};
pub use trace::init_tracing;

/// Build metadata for this library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub branch: &'static str,
    pub commit: &'static str,
}

/// Reports the crate name and version, plus the branch and commit recorded
/// in `SLOTQ_BRANCH` / `SLOTQ_COMMIT` at build time (`"unknown"` if unset).
#[must_use]
pub const fn version_info() -> VersionInfo {
    VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        branch: match option_env!("SLOTQ_BRANCH") {
            Some(branch) => branch,
            None => "unknown",
        },
        commit: match option_env!("SLOTQ_COMMIT") {
            Some(commit) => commit,
            None => "unknown",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_info_names_crate() {
        let info = version_info();
        assert_eq!(info.name, "slotq");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert!(!info.branch.is_empty());
        assert!(!info.commit.is_empty());
    }
}
