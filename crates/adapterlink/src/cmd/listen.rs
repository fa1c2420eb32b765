#[cfg(unix)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(unix)]
use std::sync::Arc;

use crate::cmd::ListenArgs;
use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

/// Read timeout used to notice Ctrl-C when the config sets none.
#[cfg(unix)]
const POLL_INTERVAL_MS: u64 = 200;

#[cfg(unix)]
pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    use std::io::ErrorKind;

    use adapterlink_device::DeviceError;
    use adapterlink_transport::TransportError;
    use tracing::{debug, info};

    use crate::cmd::{device_config, open_device};
    use crate::exit::{device_error, SUCCESS};
    use crate::output::print_packet;

    let mut config = device_config(&args.port)?;
    config.read_timeout_ms.get_or_insert(POLL_INTERVAL_MS);

    let (device, packets) = open_device(&config)?;
    info!(port = device.label(), baudrate = config.baudrate, "listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        match device.pump() {
            Ok(_) => {}
            Err(DeviceError::Transport(TransportError::Io(err)))
                if err.kind() == ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(DeviceError::Disconnected) => {
                debug!(port = device.label(), "port closed by peer");
                device
                    .transport_closed()
                    .map_err(|err| device_error("close failed", err))?;
                return Ok(SUCCESS);
            }
            Err(err) => return Err(device_error("receive failed", err)),
        }

        for packet in packets.try_iter() {
            if !type_selected(args.types.as_deref(), packet.packet_type()) {
                continue;
            }

            print_packet(&packet, device.label(), format);
            printed = printed.saturating_add(1);

            if args.count.is_some_and(|count| printed >= count) {
                device
                    .close()
                    .map_err(|err| device_error("close failed", err))?;
                return Ok(SUCCESS);
            }
        }
    }

    device
        .close()
        .map_err(|err| device_error("close failed", err))?;
    Ok(SUCCESS)
}

#[cfg(not(unix))]
pub fn run(_args: ListenArgs, _format: OutputFormat) -> CliResult<i32> {
    Err(CliError::new(
        crate::exit::USAGE,
        "serial ports are only supported on Unix platforms",
    ))
}

fn type_selected(types: Option<&[u8]>, packet_type: u8) -> bool {
    types.is_none_or(|types| types.contains(&packet_type))
}

#[cfg(unix)]
fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
