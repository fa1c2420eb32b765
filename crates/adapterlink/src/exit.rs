use std::fmt;
use std::io;

use adapterlink_device::DeviceError;
use adapterlink_frame::FrameError;
use adapterlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        TransportError::Open { ref source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::UnsupportedBaudrate(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Transport(err) => transport_error(context, err),
        FrameError::PayloadTooLarge { .. }
        | FrameError::Overrun { .. }
        | FrameError::Desynchronized
        | FrameError::Malformed(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        FrameError::ShortWrite { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
    }
}

pub fn device_error(context: &str, err: DeviceError) -> CliError {
    match err {
        DeviceError::Transport(err) => transport_error(context, err),
        DeviceError::Frame(err) => frame_error(context, err),
        DeviceError::Json(_) | DeviceError::MissingHook(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        DeviceError::ConfigRead { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        DeviceError::Disconnected | DeviceError::Closed => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_map_to_124() {
        let err = device_error(
            "receive failed",
            DeviceError::Transport(TransportError::Io(io::Error::from(io::ErrorKind::TimedOut))),
        );
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("receive failed: "));
    }

    #[test]
    fn framing_violations_are_data_errors() {
        let err = device_error(
            "receive failed",
            DeviceError::Frame(FrameError::Overrun {
                delivered: 10,
                expected: 2,
            }),
        );
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn missing_port_is_a_transport_error() {
        let err = transport_error(
            "open failed",
            TransportError::Open {
                port: "/dev/ttyUSB9".to_string(),
                source: io::Error::from(io::ErrorKind::NotFound),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }
}
