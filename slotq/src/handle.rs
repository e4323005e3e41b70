//! Opaque queue identity that doubles as a pollable readiness token.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::sync::Arc;

use mio::event::Source;
use mio::unix::SourceFd;
use mio::{Interest, Registry as MioRegistry, Token};

/// Names one queue inside a [`Registry`](crate::Registry).
///
/// A handle owns a duplicate of the queue's eventfd, shared by all of its
/// clones. The descriptor polls readable while messages are pending and stays
/// open until the last clone is dropped, even after the queue is destroyed.
/// Its number therefore cannot be handed to a newer queue while anyone still
/// holds the handle: a stale handle resolves to nothing and never sees another
/// queue's readiness.
#[derive(Clone)]
pub struct Handle {
    fd: Arc<OwnedFd>,
}

impl Handle {
    pub(crate) fn new(fd: OwnedFd) -> Self {
        Self { fd: Arc::new(fd) }
    }

    /// Whether `self` and `other` were issued for the same queue.
    pub(crate) fn same_queue(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.fd, &other.fd)
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.same_queue(other)
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_raw_fd().hash(state);
    }
}

impl AsFd for Handle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for Handle {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.as_raw_fd()).finish()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mq:{}", self.as_raw_fd())
    }
}

/// Lets a handle be registered with [`mio::Poll`] for `READABLE` interest.
impl Source for Handle {
    fn register(
        &mut self,
        registry: &MioRegistry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        SourceFd(&self.as_raw_fd()).register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &MioRegistry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        SourceFd(&self.as_raw_fd()).reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &MioRegistry) -> io::Result<()> {
        SourceFd(&self.as_raw_fd()).deregister(registry)
    }
}
