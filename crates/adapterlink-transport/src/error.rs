/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the serial port.
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        source: std::io::Error,
    },

    /// Failed to apply line settings to an opened port.
    #[error("failed to configure {port}: {source}")]
    Configure {
        port: String,
        source: std::io::Error,
    },

    /// The requested baud rate has no termios equivalent on this platform.
    #[error("unsupported baud rate: {0}")]
    UnsupportedBaudrate(u32),

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
