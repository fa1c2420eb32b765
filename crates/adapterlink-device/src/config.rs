use std::path::{Path, PathBuf};

use adapterlink_transport::DEFAULT_BAUDRATE;
use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, Result};

/// Settings for opening a serial device.
///
/// Loadable from JSON; missing fields take their defaults.
///
/// ```json
/// { "port": "/dev/ttyACM0", "baudrate": 500000, "read_timeout_ms": 250 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Path of the tty device.
    pub port: PathBuf,
    /// Line speed in baud.
    pub baudrate: u32,
    /// Read timeout for blocking reads, in milliseconds. Absent blocks indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: PathBuf::from("/dev/ttyUSB0"),
            baudrate: DEFAULT_BAUDRATE,
            read_timeout_ms: None,
        }
    }
}

impl DeviceConfig {
    /// Configuration for `port` with default line settings.
    pub fn new(port: impl Into<PathBuf>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| DeviceError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    #[cfg(unix)]
    pub fn to_serial_config(&self) -> adapterlink_transport::SerialConfig {
        adapterlink_transport::SerialConfig {
            port: self.port.clone(),
            baudrate: self.baudrate,
            read_timeout: self.read_timeout_ms.map(std::time::Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_takes_defaults() {
        let config = DeviceConfig::from_json_str("{}").unwrap();
        assert_eq!(config, DeviceConfig::default());
        assert_eq!(config.baudrate, 500_000);
    }

    #[test]
    fn fields_override_defaults() {
        let config =
            DeviceConfig::from_json_str(r#"{"port": "/dev/ttyACM1", "read_timeout_ms": 250}"#)
                .unwrap();
        assert_eq!(config.port, PathBuf::from("/dev/ttyACM1"));
        assert_eq!(config.baudrate, DEFAULT_BAUDRATE);
        assert_eq!(config.read_timeout_ms, Some(250));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = DeviceConfig::from_json_str(r#"{"parity": "even"}"#).unwrap_err();
        assert!(matches!(err, DeviceError::Json(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = DeviceConfig::from_file("/nonexistent/adapterlink.json").unwrap_err();
        match err {
            DeviceError::ConfigRead { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/adapterlink.json"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn serializes_without_absent_timeout() {
        let json = serde_json::to_string(&DeviceConfig::new("/dev/ttyUSB3")).unwrap();
        assert_eq!(json, r#"{"port":"/dev/ttyUSB3","baudrate":500000}"#);
    }

    #[cfg(unix)]
    #[test]
    fn default_matches_serial_default() {
        let device = DeviceConfig::default();
        let serial = adapterlink_transport::SerialConfig::default();
        assert_eq!(device.baudrate, serial.baudrate);
        assert_eq!(device.port, serial.port);
        assert_eq!(device.to_serial_config().read_timeout, serial.read_timeout);
    }

    #[cfg(unix)]
    #[test]
    fn converts_to_serial_config() {
        let config = DeviceConfig {
            read_timeout_ms: Some(100),
            ..DeviceConfig::new("/dev/ttyS0")
        };
        let serial = config.to_serial_config();
        assert_eq!(serial.port, PathBuf::from("/dev/ttyS0"));
        assert_eq!(serial.baudrate, 500_000);
        assert_eq!(serial.read_timeout, Some(std::time::Duration::from_millis(100)));
    }
}
