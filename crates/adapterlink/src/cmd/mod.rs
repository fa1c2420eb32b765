use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};

use adapterlink_device::{DeviceConfig, DeviceHandler, HandlerError, HandlerResult};
#[cfg(unix)]
use adapterlink_device::{Device, DeviceRegistry, SourceHooks};
use adapterlink_frame::{parse_packet_type, Packet, PacketRef};
#[cfg(unix)]
use adapterlink_transport::SerialPort;
use clap::{Args, Subcommand};

use crate::exit::{device_error, CliResult};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod types;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one payload, chunked into packets as needed.
    Send(SendArgs),
    /// Listen and print received packets.
    Listen(ListenArgs),
    /// List the well-known packet types.
    Types(TypesArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Types(args) => types::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Serial line options shared by commands that open a device.
#[derive(Args, Debug)]
pub struct PortArgs {
    /// Serial port path (e.g. /dev/ttyUSB0).
    pub port: PathBuf,
    /// Line speed in baud. Overrides the config file.
    #[arg(long, short = 'b', env = "ADAPTERLINK_BAUDRATE")]
    pub baudrate: Option<u32>,
    /// JSON device config file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub port: PortArgs,
    /// Packet type: a well-known name, decimal or 0x hex.
    #[arg(long = "type", short = 't', value_parser = parse_type_arg)]
    pub packet_type: u8,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex-encoded payload (e.g. 0a0b0c).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Wait for one packet from the peripheral and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub port: PortArgs,
    /// Only print these packet types (comma-separated).
    #[arg(long, value_delimiter = ',', value_parser = parse_type_arg)]
    pub types: Option<Vec<u8>>,
    /// Exit after printing N packets.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct TypesArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Forwards every reassembled packet to the command loop.
pub struct PacketForwarder {
    tx: Sender<Packet>,
}

impl PacketForwarder {
    pub fn channel() -> (Self, Receiver<Packet>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl DeviceHandler for PacketForwarder {
    fn on_read(&mut self, packet: PacketRef<'_>) -> HandlerResult {
        self.tx
            .send(packet.to_owned_packet())
            .map_err(|_| HandlerError::new("packet receiver dropped"))
    }
}

/// Resolve the device config: file (if any), then command-line overrides.
pub fn device_config(args: &PortArgs) -> CliResult<DeviceConfig> {
    let mut config = match &args.config {
        Some(path) => {
            DeviceConfig::from_file(path).map_err(|err| device_error("config load failed", err))?
        }
        None => DeviceConfig::default(),
    };
    config.port = args.port.clone();
    if let Some(baudrate) = args.baudrate {
        config.baudrate = baudrate;
    }
    Ok(config)
}

#[cfg(unix)]
pub type SerialDevice = Device<SerialPort, PacketForwarder>;

/// Open the configured serial port with a fresh registry.
#[cfg(unix)]
pub fn open_device(config: &DeviceConfig) -> CliResult<(SerialDevice, Receiver<Packet>)> {
    let (forwarder, rx) = PacketForwarder::channel();
    let registry = DeviceRegistry::new();
    let device = Device::open(&registry, config, &SourceHooks::detached(), forwarder)
        .map_err(|err| device_error(&format!("failed to open {}", config.port.display()), err))?;
    Ok((device, rx))
}

fn parse_type_arg(input: &str) -> Result<u8, String> {
    parse_packet_type(input).ok_or_else(|| format!("unknown packet type: {input}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_arg_accepts_names_and_numbers() {
        assert_eq!(parse_type_arg("debug"), Ok(8));
        assert_eq!(parse_type_arg("0x10"), Ok(0x10));
        assert_eq!(parse_type_arg("200"), Ok(200));
        assert!(parse_type_arg("256").is_err());
    }

    #[test]
    fn command_line_overrides_config_file() {
        let dir = std::env::temp_dir().join(format!("adapterlink-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("device.json");
        std::fs::write(
            &path,
            r#"{"port": "/dev/ttyS9", "baudrate": 115200, "read_timeout_ms": 50}"#,
        )
        .unwrap();

        let config = device_config(&PortArgs {
            port: PathBuf::from("/dev/ttyACM0"),
            baudrate: Some(921_600),
            config: Some(path),
        })
        .unwrap();

        assert_eq!(config.port, PathBuf::from("/dev/ttyACM0"));
        assert_eq!(config.baudrate, 921_600);
        assert_eq!(config.read_timeout_ms, Some(50));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn forwarder_copies_packets_out() {
        let (mut forwarder, rx) = PacketForwarder::channel();
        forwarder
            .on_read(PacketRef {
                packet_type: 7,
                payload: b"abc",
            })
            .unwrap();

        let packet = rx.try_recv().unwrap();
        assert_eq!(packet.packet_type(), 7);
        assert_eq!(packet.payload().as_ref(), b"abc");

        drop(rx);
        assert!(forwarder
            .on_read(PacketRef {
                packet_type: 7,
                payload: b"",
            })
            .is_err());
    }
}
