/// Errors that can occur while framing, reassembling or sending packets.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the packet capacity.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A read delivery carried more bytes than the current packet needs.
    ///
    /// The stream cannot be resynchronised; the device must be closed.
    #[error("framing overrun: {delivered} bytes delivered, {expected} expected")]
    Overrun { delivered: usize, expected: usize },

    /// Reassembly stopped after an earlier framing violation.
    #[error("stream desynchronized by an earlier framing violation")]
    Desynchronized,

    /// The transport accepted only part of a packet.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    /// A fixed-layout payload could not be decoded.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The transport failed while sending.
    #[error("transport error: {0}")]
    Transport(#[from] adapterlink_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
