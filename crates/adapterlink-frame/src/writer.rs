use adapterlink_transport::Transport;
use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_packet, Packet, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::{FrameError, Result};

/// Payload lengths of the packets a `count`-byte send is split into.
///
/// Always yields at least one length, so an empty send still emits a
/// zero-length packet.
pub fn chunk_lengths(count: usize) -> impl Iterator<Item = usize> {
    let packets = count.div_ceil(MAX_PAYLOAD_SIZE).max(1);
    (0..packets).map(move |i| (count - i * MAX_PAYLOAD_SIZE).min(MAX_PAYLOAD_SIZE))
}

/// Splits payloads into packets and writes them through a [`Transport`].
///
/// Packets are written one at a time in payload order, all tagged with the
/// same packet type. The first failed write aborts the send; packets already
/// written are not recalled.
pub struct ChunkedSender {
    buf: BytesMut,
}

impl ChunkedSender {
    /// Create a sender with a single reusable packet buffer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_PACKET_SIZE),
        }
    }

    /// Send `data` tagged with `packet_type`, returning the number of packets written.
    pub fn send<T>(&mut self, transport: &mut T, packet_type: u8, data: &[u8]) -> Result<usize>
    where
        T: Transport + ?Sized,
    {
        self.send_with(transport, packet_type, data, |_| Ok::<(), FrameError>(()))
    }

    /// Send `data`, calling `on_written` with the accepted byte count after each packet.
    ///
    /// An error from `on_written` aborts the send like a failed write.
    pub fn send_with<T, E, F>(
        &mut self,
        transport: &mut T,
        packet_type: u8,
        data: &[u8],
        mut on_written: F,
    ) -> std::result::Result<usize, E>
    where
        T: Transport + ?Sized,
        E: From<FrameError>,
        F: FnMut(usize) -> std::result::Result<(), E>,
    {
        let mut offset = 0usize;
        let mut packets = 0usize;

        for len in chunk_lengths(data.len()) {
            self.buf.clear();
            encode_packet(packet_type, &data[offset..offset + len], &mut self.buf)?;

            let written = transport.write(&self.buf).map_err(FrameError::from)?;
            if written != self.buf.len() {
                return Err(FrameError::ShortWrite {
                    written,
                    expected: self.buf.len(),
                }
                .into());
            }
            trace!(packet_type, length = len, "packet written");

            on_written(written)?;
            offset += len;
            packets += 1;
        }

        Ok(packets)
    }

    /// Write a single owned packet.
    pub fn write_packet<T>(&mut self, transport: &mut T, packet: &Packet) -> Result<()>
    where
        T: Transport + ?Sized,
    {
        self.send(transport, packet.packet_type(), packet.payload())
            .map(|_| ())
    }
}

impl Default for ChunkedSender {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use adapterlink_transport::{MemoryTransport, TransportError};

    use super::*;
    use crate::codec::HEADER_SIZE;
    use crate::reassembly::Reassembler;

    #[test]
    fn chunk_lengths_cover_edge_counts() {
        assert_eq!(chunk_lengths(0).collect::<Vec<_>>(), vec![0]);
        assert_eq!(chunk_lengths(1).collect::<Vec<_>>(), vec![1]);
        assert_eq!(chunk_lengths(254).collect::<Vec<_>>(), vec![254]);
        assert_eq!(chunk_lengths(255).collect::<Vec<_>>(), vec![254, 1]);
        assert_eq!(chunk_lengths(508).collect::<Vec<_>>(), vec![254, 254]);
        assert_eq!(chunk_lengths(600).collect::<Vec<_>>(), vec![254, 254, 92]);
    }

    #[test]
    fn empty_send_emits_one_zero_length_packet() {
        let (mut transport, handle) = MemoryTransport::pair();
        let mut sender = ChunkedSender::new();

        let packets = sender.send(&mut transport, 0x03, &[]).unwrap();

        assert_eq!(packets, 1);
        let writes = handle.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].as_ref(), &[0x03, 0x00]);
    }

    #[test]
    fn large_send_is_chunked_in_order() {
        let (mut transport, handle) = MemoryTransport::pair();
        let mut sender = ChunkedSender::new();
        let data: Vec<u8> = (0..600u32).map(|i| i as u8).collect();

        let packets = sender.send(&mut transport, 0x06, &data).unwrap();
        assert_eq!(packets, 3);

        let writes = handle.writes();
        let lengths: Vec<u8> = writes.iter().map(|w| w[1]).collect();
        assert_eq!(lengths, vec![254, 254, 92]);
        assert!(writes.iter().all(|w| w[0] == 0x06));

        let reassembled: Vec<u8> = writes
            .iter()
            .flat_map(|w| w[HEADER_SIZE..].iter().copied())
            .collect();
        assert_eq!(reassembled, data);
    }

    #[test]
    fn written_packets_reassemble() {
        let (mut transport, handle) = MemoryTransport::pair();
        let mut sender = ChunkedSender::new();
        sender.send(&mut transport, 0x08, b"hello").unwrap();

        let wire = handle.written_bytes();
        let mut reassembler = Reassembler::new();
        assert!(reassembler.push(&wire[..HEADER_SIZE]).unwrap().is_none());
        let packet = reassembler.push(&wire[HEADER_SIZE..]).unwrap().unwrap();
        assert_eq!(packet.packet_type, 0x08);
        assert_eq!(packet.payload, b"hello");
    }

    #[test]
    fn write_failure_aborts_remaining_chunks() {
        let (mut transport, handle) = MemoryTransport::pair();
        handle.fail_writes_after(1);
        let mut sender = ChunkedSender::new();

        let err = sender.send(&mut transport, 0x07, &[0u8; 600]).unwrap_err();

        assert!(matches!(err, FrameError::Transport(TransportError::Io(_))));
        assert_eq!(handle.writes().len(), 1);
    }

    #[test]
    fn on_written_reports_each_packet() {
        let (mut transport, _handle) = MemoryTransport::pair();
        let mut sender = ChunkedSender::new();
        let mut reported = Vec::new();

        sender
            .send_with(&mut transport, 1, &[0u8; 300], |n| {
                reported.push(n);
                Ok::<(), FrameError>(())
            })
            .unwrap();

        assert_eq!(reported, vec![256, 48]);
    }

    #[test]
    fn on_written_error_aborts_send() {
        let (mut transport, handle) = MemoryTransport::pair();
        let mut sender = ChunkedSender::new();

        let err = sender
            .send_with(&mut transport, 1, &[0u8; 600], |_| {
                Err(FrameError::Malformed("stop".to_string()))
            })
            .unwrap_err();

        assert!(matches!(err, FrameError::Malformed(_)));
        assert_eq!(handle.writes().len(), 1);
    }

    #[test]
    fn short_write_is_reported() {
        let mut sender = ChunkedSender::new();
        let err = sender.send(&mut HalfWriter, 2, b"abcd").unwrap_err();
        assert!(matches!(
            err,
            FrameError::ShortWrite {
                written: 3,
                expected: 6
            }
        ));
    }

    #[test]
    fn write_packet_sends_owned_packet() {
        let (mut transport, handle) = MemoryTransport::pair();
        let mut sender = ChunkedSender::new();
        let packet = Packet::new(5, b"stall".to_vec()).unwrap();

        sender.write_packet(&mut transport, &packet).unwrap();
        assert_eq!(handle.written_bytes(), packet.to_wire().as_ref());
    }

    struct HalfWriter;

    impl Transport for HalfWriter {
        fn read(&mut self, _buf: &mut [u8]) -> adapterlink_transport::Result<usize> {
            Ok(0)
        }

        fn write(&mut self, bytes: &[u8]) -> adapterlink_transport::Result<usize> {
            Ok(bytes.len() / 2)
        }

        fn set_next_read_size(&mut self, _size: usize) {}

        fn next_read_size(&self) -> usize {
            0
        }

        fn close(&mut self) -> adapterlink_transport::Result<()> {
            Ok(())
        }

        fn label(&self) -> String {
            "half".to_string()
        }
    }
}
