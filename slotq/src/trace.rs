//! Queue lifecycle and failure diagnostics.
//!
//! With `--features tracing` the registry and its queues report:
//!
//! - `debug`: queue created (with its slot geometry), queue destroyed,
//!   default configuration chosen, queues still live when a registry drops,
//!   and the backpressure outcomes `QueueFull` / `QueueEmpty`.
//! - `warn`: a failed readiness wait inside `pop_timeout`.
//! - `error`: unknown handles, rejected configurations, failed allocation,
//!   oversized messages, short caller buffers and eventfd failures.
//!
//! Events carry the handle as `mq:<fd>`. Without the feature the three
//! macros expand to nothing and their arguments are never evaluated.

/// Prints slotq events to stderr with thread ids and uptime stamps.
///
/// `RUST_LOG` selects what is shown; unset, everything from `slotq` is.
/// Calling it again after a subscriber is installed has no effect, so each
/// test may call it. Without the `tracing` feature this is a no-op.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("slotq=trace"));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_ids(true)
        .with_timer(fmt::time::uptime());

    let _ = tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! discard {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use {discard as debug, discard as error, discard as warn};
