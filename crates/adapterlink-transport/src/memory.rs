use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// In-process transport backed by shared buffers.
///
/// Created in pairs with a [`MemoryHandle`] that plays the peripheral side:
/// it queues inbound bytes, inspects what was written, and can inject write
/// failures. Reads with nothing queued fail with `WouldBlock` until
/// [`MemoryHandle::finish`] marks end of stream.
#[derive(Debug)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
    next_read_size: usize,
}

/// Peripheral-side view of a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    inbound: BytesMut,
    writes: Vec<Bytes>,
    read_sizes: Vec<usize>,
    read_timeouts: Vec<Option<Duration>>,
    writes_before_failure: Option<usize>,
    eof: bool,
    close_count: usize,
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryTransport {
    /// Create a connected transport/handle pair.
    pub fn pair() -> (Self, MemoryHandle) {
        let state = Arc::new(Mutex::new(MemoryState::default()));
        let transport = Self {
            state: Arc::clone(&state),
            next_read_size: usize::MAX,
        };
        (transport, MemoryHandle { state })
    }

    fn ensure_open(&self) -> Result<MutexGuard<'_, MemoryState>> {
        let state = lock(&self.state);
        if state.close_count > 0 {
            return Err(TransportError::Closed);
        }
        Ok(state)
    }
}

impl Transport for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let limit = buf.len().min(self.next_read_size);
        let mut state = self.ensure_open()?;
        if state.inbound.is_empty() {
            if state.eof {
                return Ok(0);
            }
            return Err(std::io::Error::from(ErrorKind::WouldBlock).into());
        }
        let n = limit.min(state.inbound.len());
        buf[..n].copy_from_slice(&state.inbound[..n]);
        state.inbound.advance(n);
        Ok(n)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut state = self.ensure_open()?;
        if let Some(remaining) = state.writes_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(
                    std::io::Error::new(ErrorKind::BrokenPipe, "injected write failure").into(),
                );
            }
            *remaining -= 1;
        }
        trace!(len = bytes.len(), "memory transport write");
        state.writes.push(Bytes::copy_from_slice(bytes));
        Ok(bytes.len())
    }

    fn set_next_read_size(&mut self, size: usize) {
        self.next_read_size = size;
        lock(&self.state).read_sizes.push(size);
    }

    fn next_read_size(&self) -> usize {
        self.next_read_size
    }

    fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.close_count += 1;
        if state.close_count > 1 {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        lock(&self.state).read_timeouts.push(timeout);
    }

    fn label(&self) -> String {
        "memory".to_string()
    }
}

impl MemoryHandle {
    /// Queue bytes for the transport to read.
    pub fn push_inbound(&self, bytes: &[u8]) {
        lock(&self.state).inbound.extend_from_slice(bytes);
    }

    /// Mark end of stream: reads return `Ok(0)` once the queue drains.
    pub fn finish(&self) {
        lock(&self.state).eof = true;
    }

    /// Each buffer passed to `write`, in order.
    pub fn writes(&self) -> Vec<Bytes> {
        lock(&self.state).writes.clone()
    }

    /// All written bytes concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        lock(&self.state)
            .writes
            .iter()
            .flat_map(|w| w.iter().copied())
            .collect()
    }

    /// Every value passed to `set_next_read_size`, in order.
    pub fn read_sizes(&self) -> Vec<usize> {
        lock(&self.state).read_sizes.clone()
    }

    /// Every value passed to `set_read_timeout`, in order.
    pub fn read_timeouts(&self) -> Vec<Option<Duration>> {
        lock(&self.state).read_timeouts.clone()
    }

    /// Let `count` more writes succeed, then fail every write after that.
    pub fn fail_writes_after(&self, count: usize) {
        lock(&self.state).writes_before_failure = Some(count);
    }

    /// True once the transport has been closed.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).close_count > 0
    }

    /// How many times `close` was called.
    pub fn close_count(&self) -> usize {
        lock(&self.state).close_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_honours_next_read_size() {
        let (mut transport, handle) = MemoryTransport::pair();
        handle.push_inbound(b"abcdef");
        transport.set_next_read_size(2);

        let mut buf = [0u8; 16];
        assert_eq!(transport.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ab");

        transport.set_next_read_size(16);
        assert_eq!(transport.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"cdef");
        assert_eq!(handle.read_sizes(), vec![2, 16]);
    }

    #[test]
    fn empty_queue_would_block_until_finished() {
        let (mut transport, handle) = MemoryTransport::pair();
        let mut buf = [0u8; 4];

        let err = transport.read(&mut buf).unwrap_err();
        assert!(matches!(err, TransportError::Io(e) if e.kind() == ErrorKind::WouldBlock));

        handle.finish();
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn read_timeouts_are_recorded() {
        let (mut transport, handle) = MemoryTransport::pair();
        transport.set_read_timeout(Some(Duration::from_millis(40)));
        transport.set_read_timeout(None);
        assert_eq!(
            handle.read_timeouts(),
            vec![Some(Duration::from_millis(40)), None]
        );
        assert!(transport.read_canceller().is_none());
    }

    #[test]
    fn writes_are_recorded_in_order() {
        let (mut transport, handle) = MemoryTransport::pair();
        transport.write(b"one").unwrap();
        transport.write(b"two").unwrap();

        let writes = handle.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].as_ref(), b"one");
        assert_eq!(handle.written_bytes(), b"onetwo");
    }

    #[test]
    fn injected_write_failure() {
        let (mut transport, handle) = MemoryTransport::pair();
        handle.fail_writes_after(1);

        assert!(transport.write(b"ok").is_ok());
        assert!(matches!(
            transport.write(b"boom"),
            Err(TransportError::Io(e)) if e.kind() == ErrorKind::BrokenPipe
        ));
        assert_eq!(handle.writes().len(), 1);
    }

    #[test]
    fn operations_fail_after_close() {
        let (mut transport, handle) = MemoryTransport::pair();
        transport.close().unwrap();

        assert!(handle.is_closed());
        assert!(matches!(transport.write(b"x"), Err(TransportError::Closed)));
        assert!(matches!(transport.close(), Err(TransportError::Closed)));
        assert_eq!(handle.close_count(), 2);
    }
}
