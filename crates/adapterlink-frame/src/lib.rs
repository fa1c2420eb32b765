//! Packet framing for the adapter serial link.
//!
//! Every packet is framed with a fixed 2-byte header:
//! - 1 byte packet type (opcode, opaque to this crate)
//! - 1 byte payload length (0..=254)
//!
//! followed by exactly `length` payload bytes, so a packet never exceeds 256
//! bytes on the wire. [`Reassembler`] rebuilds packets from arbitrarily sized
//! read deliveries; [`ChunkedSender`] splits large payloads into packets.

pub mod codec;
pub mod error;
pub mod packet_type;
pub mod reassembly;
pub mod usb;
pub mod writer;

pub use codec::{
    encode_packet, Header, Packet, PacketRef, HEADER_SIZE, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE,
};
pub use error::{FrameError, Result};
pub use packet_type::{
    known_packet_types, packet_type_name, parse_packet_type, CONTROL, CONTROL_STALL, DEBUG,
    DESCRIPTORS, ENDPOINTS, IN, INDEX, OUT, RESET,
};
pub use reassembly::{Reassembler, ReassemblyState};
pub use writer::{chunk_lengths, ChunkedSender};
