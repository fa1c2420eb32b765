//! Byte-stream transport abstraction for adapterlink.
//!
//! Provides the contract the framing layer consumes from a serial link:
//! - raw reads and writes
//! - a "deliver exactly N bytes next" read-size control
//! - close, plus the raw readiness source for host event loops
//!
//! Two implementations ship here: [`SerialPort`] (Unix tty devices, raw 8N1)
//! and [`MemoryTransport`] (in-process, for tests and simulations).

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod serial;

pub use error::{Result, TransportError};
pub use memory::{MemoryHandle, MemoryTransport};
pub use traits::{RawSource, ReadCanceller, Transport};

#[cfg(unix)]
pub use serial::{SerialConfig, SerialPort};

/// Line speed the adapter firmware runs its USART at.
pub const DEFAULT_BAUDRATE: u32 = 500_000;
