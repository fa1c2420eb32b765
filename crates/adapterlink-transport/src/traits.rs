use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Raw readiness source handed to host event loops.
#[cfg(unix)]
pub type RawSource = std::os::fd::RawFd;

/// Raw readiness source handed to host event loops.
#[cfg(not(unix))]
pub type RawSource = usize;

/// Wakes a read blocked on another thread.
///
/// Obtained from [`Transport::read_canceller`] before the transport is moved
/// behind a lock. After [`cancel`](ReadCanceller::cancel) the in-flight read and
/// every later read fail with [`TransportError::Closed`](crate::TransportError::Closed).
#[derive(Clone)]
pub struct ReadCanceller(Arc<dyn Fn() + Send + Sync>);

impl ReadCanceller {
    pub fn new(cancel: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(cancel))
    }

    pub fn cancel(&self) {
        (self.0)()
    }
}

impl std::fmt::Debug for ReadCanceller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReadCanceller")
    }
}

/// A connected byte-oriented link to the peripheral.
///
/// The framing layer drives the link through this trait only. Implementations
/// own the underlying resource; `close` releases it and every later call must
/// fail with [`TransportError::Closed`](crate::TransportError::Closed).
pub trait Transport: Send {
    /// Read up to `min(buf.len(), next_read_size())` bytes.
    ///
    /// Returns `Ok(0)` when the link reached end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write the whole buffer, returning the number of bytes accepted.
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Request that the next read delivers at most `size` bytes.
    fn set_next_read_size(&mut self, size: usize);

    /// Current read size request.
    fn next_read_size(&self) -> usize;

    /// Release the underlying resource.
    fn close(&mut self) -> Result<()>;

    /// Readiness source for event-loop registration, if the link has one.
    fn source(&self) -> Option<RawSource> {
        None
    }

    /// Bound how long the next reads may block. `None` blocks until data arrives.
    ///
    /// Links whose reads never block ignore this.
    fn set_read_timeout(&mut self, _timeout: Option<Duration>) {}

    /// Handle that aborts a blocked [`read`](Transport::read) from another thread.
    ///
    /// Links whose reads can block indefinitely must provide one, otherwise a
    /// stalled read cannot be interrupted by closing the device.
    fn read_canceller(&self) -> Option<ReadCanceller> {
        None
    }

    /// Human-readable label for diagnostics (port path, "memory", ...).
    fn label(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        (**self).write(bytes)
    }

    fn set_next_read_size(&mut self, size: usize) {
        (**self).set_next_read_size(size)
    }

    fn next_read_size(&self) -> usize {
        (**self).next_read_size()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn source(&self) -> Option<RawSource> {
        (**self).source()
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        (**self).set_read_timeout(timeout)
    }

    fn read_canceller(&self) -> Option<ReadCanceller> {
        (**self).read_canceller()
    }

    fn label(&self) -> String {
        (**self).label()
    }
}
