//! Fixed payload layouts understood by the adapter firmware.
//!
//! The framing layer carries these as opaque bytes; the helpers here only
//! build and parse the byte layouts (little-endian, no padding).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Line speed of the firmware's USART, shared with the serial transport.
pub use adapterlink_transport::DEFAULT_BAUDRATE;

/// Capacity of the firmware's descriptor table.
pub const MAX_DESCRIPTORS_SIZE: usize = 1024;

/// Maximum number of descriptor index entries.
pub const MAX_DESCRIPTORS: usize = 32;

/// Maximum number of non-control endpoints.
pub const MAX_ENDPOINTS: usize = 6;

/// Maximum packet size on endpoint 0.
pub const MAX_PACKET_SIZE_EP0: usize = 64;

/// Maximum payload size on non-control endpoints.
pub const MAX_PAYLOAD_SIZE_EP: usize = 64;

/// One entry of the descriptor index table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorIndex {
    /// Offset of the descriptor within the descriptor table.
    pub offset: u16,
    /// `wValue` of the GET_DESCRIPTOR request that selects it.
    pub value: u16,
    /// `wIndex` of the GET_DESCRIPTOR request that selects it.
    pub index: u16,
    /// Descriptor length in bytes.
    pub length: u16,
}

impl DescriptorIndex {
    /// Encoded size in bytes.
    pub const SIZE: usize = 8;

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16_le(self.offset);
        dst.put_u16_le(self.value);
        dst.put_u16_le(self.index);
        dst.put_u16_le(self.length);
    }

    pub fn decode(mut src: &[u8]) -> Result<Self> {
        if src.len() != Self::SIZE {
            return Err(FrameError::Malformed(format!(
                "descriptor index needs {} bytes, got {}",
                Self::SIZE,
                src.len()
            )));
        }
        Ok(Self {
            offset: src.get_u16_le(),
            value: src.get_u16_le(),
            index: src.get_u16_le(),
            length: src.get_u16_le(),
        })
    }

    /// Encode a whole index table, rejecting more than [`MAX_DESCRIPTORS`] entries.
    pub fn encode_table(entries: &[DescriptorIndex]) -> Result<Bytes> {
        if entries.len() > MAX_DESCRIPTORS {
            return Err(FrameError::Malformed(format!(
                "{} descriptors exceed the limit of {MAX_DESCRIPTORS}",
                entries.len()
            )));
        }
        let mut dst = BytesMut::with_capacity(entries.len() * Self::SIZE);
        for entry in entries {
            entry.encode(&mut dst);
        }
        Ok(dst.freeze())
    }
}

/// One entry of the endpoint configuration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Endpoint number; 0 terminates the table.
    pub number: u8,
    /// USB transfer type.
    pub kind: u8,
    /// Maximum packet size.
    pub size: u8,
}

impl EndpointConfig {
    /// Encoded size in bytes.
    pub const SIZE: usize = 3;

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.number);
        dst.put_u8(self.kind);
        dst.put_u8(self.size);
    }

    /// Decode a table, stopping at the terminating entry (number 0) if present.
    pub fn decode_table(src: &[u8]) -> Result<Vec<Self>> {
        if src.len() % Self::SIZE != 0 {
            return Err(FrameError::Malformed(format!(
                "endpoint table length {} is not a multiple of {}",
                src.len(),
                Self::SIZE
            )));
        }
        let entries: Vec<Self> = src
            .chunks_exact(Self::SIZE)
            .map(|c| Self {
                number: c[0],
                kind: c[1],
                size: c[2],
            })
            .take_while(|e| e.number != 0)
            .collect();
        if entries.len() > MAX_ENDPOINTS {
            return Err(FrameError::Malformed(format!(
                "{} endpoints exceed the limit of {MAX_ENDPOINTS}",
                entries.len()
            )));
        }
        Ok(entries)
    }

    /// Encode a table followed by its terminating entry.
    pub fn encode_table(entries: &[EndpointConfig]) -> Result<Bytes> {
        if entries.len() > MAX_ENDPOINTS {
            return Err(FrameError::Malformed(format!(
                "{} endpoints exceed the limit of {MAX_ENDPOINTS}",
                entries.len()
            )));
        }
        let mut dst = BytesMut::with_capacity((entries.len() + 1) * Self::SIZE);
        for entry in entries {
            entry.encode(&mut dst);
        }
        dst.put_bytes(0, Self::SIZE);
        Ok(dst.freeze())
    }
}

/// Data for a non-control endpoint (IN/OUT packets).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPacket {
    /// Endpoint address; 0 means nothing to send.
    pub endpoint: u8,
    /// Endpoint data, at most [`MAX_PAYLOAD_SIZE_EP`] bytes.
    pub data: Bytes,
}

impl EndpointPacket {
    pub fn new(endpoint: u8, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.len() > MAX_PAYLOAD_SIZE_EP {
            return Err(FrameError::PayloadTooLarge {
                size: data.len(),
                max: MAX_PAYLOAD_SIZE_EP,
            });
        }
        Ok(Self { endpoint, data })
    }

    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(1 + self.data.len());
        dst.put_u8(self.endpoint);
        dst.put_slice(&self.data);
        dst.freeze()
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        let Some((&endpoint, data)) = src.split_first() else {
            return Err(FrameError::Malformed("empty endpoint packet".to_string()));
        };
        Self::new(endpoint, Bytes::copy_from_slice(data))
    }
}
