use tracing::{trace, warn};

use crate::codec::{Header, PacketRef, HEADER_SIZE, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::{FrameError, Result};

/// Reassembly progress for the packet currently being received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyState {
    /// Fewer than [`HEADER_SIZE`] bytes accumulated.
    AwaitingHeader,
    /// Header complete, payload still incomplete.
    AwaitingPayload,
    /// A framing violation was detected; only [`Reassembler::reset`] leaves this state.
    Failed,
}

/// Rebuilds packets from read deliveries of arbitrary size.
///
/// Holds exactly one packet's worth of storage, reused for every packet. The
/// transport is expected to deliver at most [`next_read_size`] bytes at a
/// time; delivering more is a fatal framing violation since the byte stream
/// has no resynchronisation marker.
///
/// [`next_read_size`]: Reassembler::next_read_size
pub struct Reassembler {
    buf: [u8; MAX_PACKET_SIZE],
    filled: usize,
    failed: bool,
}

impl Reassembler {
    /// Create an empty reassembler awaiting a header.
    pub fn new() -> Self {
        Self {
            buf: [0u8; MAX_PACKET_SIZE],
            filled: 0,
            failed: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReassemblyState {
        if self.failed {
            ReassemblyState::Failed
        } else if self.filled < HEADER_SIZE {
            ReassemblyState::AwaitingHeader
        } else {
            ReassemblyState::AwaitingPayload
        }
    }

    /// Bytes accumulated for the current packet.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Header of the packet being received, once complete.
    pub fn header(&self) -> Option<Header> {
        (self.filled >= HEADER_SIZE).then(|| Header::from_bytes([self.buf[0], self.buf[1]]))
    }

    /// Exact number of bytes still needed to complete the current header or packet.
    ///
    /// Zero only in [`ReassemblyState::Failed`].
    pub fn next_read_size(&self) -> usize {
        match self.state() {
            ReassemblyState::AwaitingHeader => HEADER_SIZE - self.filled,
            ReassemblyState::AwaitingPayload => {
                let length = usize::from(self.buf[1]);
                length - (self.filled - HEADER_SIZE)
            }
            ReassemblyState::Failed => 0,
        }
    }

    /// Feed one read delivery.
    ///
    /// Returns the completed packet when `bytes` finishes one; the reassembler
    /// is already reset for the next packet when this returns.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Option<PacketRef<'_>>> {
        if self.failed {
            return Err(FrameError::Desynchronized);
        }

        let expected = self.next_read_size();
        if bytes.len() > expected {
            warn!(
                delivered = bytes.len(),
                expected,
                filled = self.filled,
                "read delivery exceeds remaining packet size"
            );
            self.failed = true;
            return Err(FrameError::Overrun {
                delivered: bytes.len(),
                expected,
            });
        }
        if bytes.is_empty() {
            return Ok(None);
        }

        let start = self.filled;
        self.buf[start..start + bytes.len()].copy_from_slice(bytes);
        self.filled += bytes.len();

        if start < HEADER_SIZE && self.filled == HEADER_SIZE {
            let length = usize::from(self.buf[1]);
            if length > MAX_PAYLOAD_SIZE {
                warn!(length, "packet header announces oversized payload");
                self.failed = true;
                return Err(FrameError::PayloadTooLarge {
                    size: length,
                    max: MAX_PAYLOAD_SIZE,
                });
            }
        }

        if self.next_read_size() > 0 {
            return Ok(None);
        }

        let total = self.filled;
        self.filled = 0;
        trace!(
            packet_type = self.buf[0],
            length = total - HEADER_SIZE,
            "packet reassembled"
        );
        Ok(Some(PacketRef {
            packet_type: self.buf[0],
            payload: &self.buf[HEADER_SIZE..total],
        }))
    }

    /// Discard any partial packet and clear a failure.
    pub fn reset(&mut self) {
        self.filled = 0;
        self.failed = false;
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Reassembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reassembler")
            .field("state", &self.state())
            .field("filled", &self.filled)
            .field("next_read_size", &self.next_read_size())
            .finish()
    }
}
