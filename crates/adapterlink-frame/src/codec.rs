use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Packet header: type (1) + length (1) = 2 bytes.
pub const HEADER_SIZE: usize = 2;

/// Maximum packet size on the wire, header included.
///
/// Bounded by the peripheral's RAM, not by the length byte.
pub const MAX_PACKET_SIZE: usize = 256;

/// Maximum payload size: 254 bytes.
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - HEADER_SIZE;

/// Packet header as laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Packet type (opcode).
    pub packet_type: u8,
    /// Payload length in bytes.
    pub length: u8,
}

impl Header {
    /// Parse a header from its two wire bytes.
    pub fn from_bytes(bytes: [u8; HEADER_SIZE]) -> Self {
        Self {
            packet_type: bytes[0],
            length: bytes[1],
        }
    }

    /// Wire representation of this header.
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        [self.packet_type, self.length]
    }

    /// Payload length as `usize`.
    pub fn payload_len(self) -> usize {
        usize::from(self.length)
    }
}

/// An owned packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    packet_type: u8,
    payload: Bytes,
}

impl Packet {
    /// Create a packet, rejecting payloads above [`MAX_PAYLOAD_SIZE`].
    pub fn new(packet_type: u8, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self {
            packet_type,
            payload,
        })
    }

    /// The packet type.
    pub fn packet_type(&self) -> u8 {
        self.packet_type
    }

    /// The payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload length.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True for a zero-length packet.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The header this packet is framed with.
    pub fn header(&self) -> Header {
        Header {
            packet_type: self.packet_type,
            // Checked against MAX_PAYLOAD_SIZE in `new`.
            length: self.payload.len() as u8,
        }
    }

    /// The total wire size of this packet (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode this packet into a fresh buffer.
    pub fn to_wire(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        dst.put_slice(&self.header().to_bytes());
        dst.put_slice(&self.payload);
        dst.freeze()
    }
}

/// A packet borrowed from a reassembly buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketRef<'a> {
    /// The packet type.
    pub packet_type: u8,
    /// The payload bytes.
    pub payload: &'a [u8],
}

impl PacketRef<'_> {
    /// Payload length.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True for a zero-length packet.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Copy the payload out of the reassembly buffer.
    pub fn to_owned_packet(&self) -> Packet {
        Packet {
            packet_type: self.packet_type,
            payload: Bytes::copy_from_slice(self.payload),
        }
    }
}

/// Encode a packet into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────┬────────────┬──────────────────┐
/// │ Type (1B) │ Length (1B)│ Payload           │
/// │           │ 0..=254    │ (Length bytes)    │
/// └───────────┴────────────┴──────────────────┘
/// ```
pub fn encode_packet(packet_type: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(packet_type);
    dst.put_u8(payload.len() as u8);
    dst.put_slice(payload);
    Ok(())
}
