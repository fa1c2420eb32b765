use std::path::PathBuf;

use crate::handler::HandlerError;
use crate::hooks::HookError;

/// Errors that can occur in device operations.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// A mandatory event-source hook was not supplied.
    #[error("missing {0} hook")]
    MissingHook(&'static str),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] adapterlink_transport::TransportError),

    /// Framing error. Reassembly errors are fatal for the device.
    #[error("frame error: {0}")]
    Frame(#[from] adapterlink_frame::FrameError),

    /// The caller's handler reported a failure.
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),

    /// An event-source hook failed.
    #[error("event source hook failed: {0}")]
    Registration(HookError),

    /// The link reached end of stream.
    #[error("device disconnected")]
    Disconnected,

    /// The device has already been closed.
    #[error("device closed")]
    Closed,

    /// Configuration could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, DeviceError>;
