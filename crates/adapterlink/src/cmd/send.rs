use std::fs;
#[cfg(unix)]
use std::sync::mpsc::{Receiver, TryRecvError};
#[cfg(unix)]
use std::time::Instant;
use std::time::Duration;

#[cfg(unix)]
use adapterlink_device::{Device, DeviceError};
#[cfg(unix)]
use adapterlink_frame::Packet;
#[cfg(unix)]
use adapterlink_transport::{Transport, TransportError};

#[cfg(unix)]
use crate::cmd::PacketForwarder;
use crate::cmd::SendArgs;
#[cfg(unix)]
use crate::exit::{device_error, INTERNAL, TIMEOUT};
use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

#[cfg(unix)]
pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    use tracing::info;

    use crate::cmd::{device_config, open_device};
    use crate::exit::SUCCESS;
    use crate::output::print_packet;

    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;

    let mut config = device_config(&args.port)?;
    if args.wait {
        let millis = u64::try_from(wait_timeout.as_millis()).unwrap_or(u64::MAX);
        config.read_timeout_ms = Some(millis);
    }

    let (device, packets) = open_device(&config)?;
    let sent = device
        .send(args.packet_type, &payload)
        .map_err(|err| device_error("send failed", err))?;
    info!(
        port = device.label(),
        packet_type = args.packet_type,
        bytes = payload.len(),
        packets = sent,
        "payload sent"
    );

    if args.wait {
        let packet = wait_for_packet(&device, &packets, wait_timeout)?;
        print_packet(&packet, device.label(), format);
    }

    device
        .close()
        .map_err(|err| device_error("close failed", err))?;
    Ok(SUCCESS)
}

#[cfg(not(unix))]
pub fn run(_args: SendArgs, _format: OutputFormat) -> CliResult<i32> {
    Err(CliError::new(
        USAGE,
        "serial ports are only supported on Unix platforms",
    ))
}

/// Pump `device` until a packet arrives or `wait` has elapsed.
///
/// Every read is bounded by the time left before the deadline.
#[cfg(unix)]
fn wait_for_packet<T: Transport>(
    device: &Device<T, PacketForwarder>,
    packets: &Receiver<Packet>,
    wait: Duration,
) -> CliResult<Packet> {
    let deadline = Instant::now() + wait;
    loop {
        match packets.try_recv() {
            Ok(packet) => return Ok(packet),
            Err(TryRecvError::Disconnected) => {
                return Err(CliError::new(INTERNAL, "packet channel closed"));
            }
            Err(TryRecvError::Empty) => {}
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CliError::new(TIMEOUT, "no packet received before timeout"));
        }
        device
            .set_read_timeout(Some(remaining))
            .map_err(|err| device_error("receive failed", err))?;

        match device.pump() {
            Ok(_) => {}
            Err(DeviceError::Transport(TransportError::Io(err)))
                if err.kind() == std::io::ErrorKind::TimedOut => {}
            Err(err) => return Err(device_error("receive failed", err)),
        }
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(hex) = &args.hex {
        return decode_hex(hex);
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

fn decode_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "--hex needs an even number of digits"));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).unwrap_or("");
            u8::from_str_radix(text, 16)
                .map_err(|_| CliError::new(USAGE, format!("invalid hex byte: {text:?}")))
        })
        .collect()
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    mod wait {
        use std::sync::{Arc, Mutex};
        use std::thread;

        use adapterlink_device::{DeviceRegistry, SourceHooks};
        use adapterlink_transport::MemoryTransport;

        use super::*;

        /// Link that never answers: each read sleeps out its full timeout.
        struct SilentLink {
            timeout: Option<Duration>,
            timeouts: Arc<Mutex<Vec<Option<Duration>>>>,
        }

        impl Transport for SilentLink {
            fn read(&mut self, _buf: &mut [u8]) -> adapterlink_transport::Result<usize> {
                thread::sleep(self.timeout.unwrap_or(Duration::from_secs(3)));
                Err(std::io::Error::from(std::io::ErrorKind::TimedOut).into())
            }

            fn write(&mut self, bytes: &[u8]) -> adapterlink_transport::Result<usize> {
                Ok(bytes.len())
            }

            fn set_next_read_size(&mut self, _size: usize) {}

            fn next_read_size(&self) -> usize {
                2
            }

            fn close(&mut self) -> adapterlink_transport::Result<()> {
                Ok(())
            }

            fn set_read_timeout(&mut self, timeout: Option<Duration>) {
                self.timeout = timeout;
                self.timeouts.lock().unwrap().push(timeout);
            }

            fn label(&self) -> String {
                "silent".to_string()
            }
        }

        #[test]
        fn wait_does_not_outlast_its_timeout() {
            let registry = DeviceRegistry::new();
            let timeouts = Arc::new(Mutex::new(Vec::new()));
            let link = SilentLink {
                timeout: Some(Duration::from_millis(200)),
                timeouts: timeouts.clone(),
            };
            let (forwarder, packets) = PacketForwarder::channel();
            let device =
                Device::open_with(&registry, &SourceHooks::detached(), forwarder, move || {
                    Ok(link)
                })
                .unwrap();

            let wait = Duration::from_millis(200);
            let started = Instant::now();
            let err = wait_for_packet(&device, &packets, wait).unwrap_err();
            let elapsed = started.elapsed();

            assert_eq!(err.code, TIMEOUT);
            assert!(elapsed < Duration::from_millis(350), "waited {elapsed:?}");
            let timeouts = timeouts.lock().unwrap();
            assert!(!timeouts.is_empty());
            assert!(timeouts.iter().all(|t| matches!(t, Some(t) if *t <= wait)));
        }

        #[test]
        fn wait_returns_first_packet() {
            let registry = DeviceRegistry::new();
            let (transport, peripheral) = MemoryTransport::pair();
            let (forwarder, packets) = PacketForwarder::channel();
            let device =
                Device::open_with(&registry, &SourceHooks::detached(), forwarder, move || {
                    Ok(transport)
                })
                .unwrap();
            peripheral.push_inbound(&Packet::new(0x08, b"pong".to_vec()).unwrap().to_wire());

            let packet = wait_for_packet(&device, &packets, Duration::from_secs(1)).unwrap();

            assert_eq!(packet.packet_type(), 0x08);
            assert_eq!(packet.payload().as_ref(), b"pong");
            assert_eq!(peripheral.read_timeouts().len(), 2);
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn decode_hex_accepts_separators() {
        assert_eq!(decode_hex("0a0B ff").unwrap(), vec![0x0a, 0x0b, 0xff]);
        assert_eq!(decode_hex("de:ad").unwrap(), vec![0xde, 0xad]);
        assert!(decode_hex("").unwrap().is_empty());
    }

    #[test]
    fn decode_hex_rejects_bad_input() {
        assert_eq!(decode_hex("abc").unwrap_err().code, USAGE);
        assert_eq!(decode_hex("zz").unwrap_err().code, USAGE);
    }
}
