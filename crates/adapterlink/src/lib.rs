//! Packet framing over serial links to USB-emulating adapter peripherals.
//!
//! Every packet carries a 2-byte header (type, length) and at most 254 bytes
//! of payload. The host reassembles packets from arbitrarily sized read
//! deliveries and splits large payloads into packets on send.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream transport trait, Unix serial port, in-memory link
//! - [`frame`]: packet model, reassembly state machine, chunked sender
//! - [`device`]: device lifecycle, handlers and registry (behind `device` feature)

/// Re-export transport types.
pub mod transport {
    pub use adapterlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use adapterlink_frame::*;
}

/// Re-export device types (requires `device` feature).
#[cfg(feature = "device")]
pub mod device {
    pub use adapterlink_device::*;
}
