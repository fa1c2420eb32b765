use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use adapterlink_frame::{
    ChunkedSender, FrameError, Reassembler, ReassemblyState, HEADER_SIZE, MAX_PACKET_SIZE,
};
#[cfg(unix)]
use adapterlink_transport::SerialPort;
use adapterlink_transport::{ReadCanceller, Transport, TransportError};
use tracing::{debug, error, trace, warn};

#[cfg(unix)]
use crate::config::DeviceConfig;
use crate::error::{DeviceError, Result};
use crate::handler::DeviceHandler;
use crate::hooks::{EventSource, RemoveHook, SourceHooks};
use crate::registry::{DeviceId, DeviceInfo, DeviceRegistry, RegisteredDevice};

/// Per-device framing state, guarded by the device mutex.
struct DeviceCore<H> {
    id: DeviceId,
    reassembler: Reassembler,
    sender: ChunkedSender,
    handler: H,
    source: EventSource,
    remove_hook: RemoveHook,
    open: bool,
}

impl<H: DeviceHandler> DeviceCore<H> {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(DeviceError::Closed)
        }
    }

    fn deliver<T: Transport>(&mut self, transport: &mut T, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;

        let result = match self.reassembler.push(bytes) {
            Ok(Some(packet)) => {
                trace!(
                    device = %self.id,
                    packet_type = packet.packet_type,
                    length = packet.len(),
                    "packet delivered"
                );
                self.handler.on_read(packet).map_err(DeviceError::from)
            }
            Ok(None) => Ok(()),
            Err(err) => {
                error!(
                    device = %self.id,
                    error = %err,
                    "framing violation, device must be closed"
                );
                return Err(err.into());
            }
        };

        transport.set_next_read_size(self.reassembler.next_read_size());
        result
    }

    fn send<T: Transport>(
        &mut self,
        transport: &mut T,
        packet_type: u8,
        data: &[u8],
    ) -> Result<usize> {
        self.ensure_open()?;
        let Self {
            sender, handler, ..
        } = self;
        sender.send_with(transport, packet_type, data, |transferred| {
            handler
                .on_write_complete(transferred)
                .map_err(DeviceError::from)
        })
    }
}

/// State shared between a [`Device`] and its registry entry.
///
/// Lock order is core, then transport. A blocked read holds only the
/// transport lock; teardown fires the read canceller before taking either.
struct Shared<T, H> {
    id: DeviceId,
    core: Mutex<DeviceCore<H>>,
    transport: Mutex<T>,
    canceller: Option<ReadCanceller>,
}

impl<T: Transport, H: DeviceHandler> Shared<T, H> {
    fn lock(&self) -> MutexGuard<'_, DeviceCore<H>> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transport(&self) -> MutexGuard<'_, T> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_read(&self) {
        if let Some(canceller) = &self.canceller {
            canceller.cancel();
        }
    }

    fn deliver(&self, bytes: &[u8]) -> Result<()> {
        let mut core = self.lock();
        core.deliver(&mut *self.transport(), bytes)
    }

    fn send(&self, packet_type: u8, data: &[u8]) -> Result<usize> {
        let mut core = self.lock();
        core.send(&mut *self.transport(), packet_type, data)
    }

    /// Release everything the device holds. `Ok(false)` if already closed.
    fn teardown(&self) -> Result<bool> {
        self.cancel_read();
        let mut core = self.lock();
        self.close_locked(&mut core)
    }

    /// Callers fire [`cancel_read`](Shared::cancel_read) before taking the core
    /// lock, otherwise the transport lock may still be held by a blocked read.
    fn close_locked(&self, core: &mut DeviceCore<H>) -> Result<bool> {
        if !core.open {
            return Ok(false);
        }
        core.open = false;
        core.reassembler.reset();

        let removed = (core.remove_hook)(&core.source).map_err(DeviceError::Registration);
        if let Err(err) = &removed {
            warn!(device = %self.id, error = %err, "event source removal failed");
        }
        let closed = self.transport().close().map_err(DeviceError::from);
        if let Err(err) = &closed {
            warn!(device = %self.id, error = %err, "transport close failed");
        }

        debug!(device = %self.id, "device closed");
        removed.and(closed).map(|()| true)
    }
}

impl<T: Transport, H: DeviceHandler> RegisteredDevice for Shared<T, H> {
    fn shutdown(&self) -> Result<bool> {
        self.teardown()
    }
}

/// One open connection to the adapter peripheral.
///
/// Owns its transport and handler. Read deliveries go through
/// [`deliver`](Device::deliver) (or [`pump`](Device::pump) for blocking
/// transports); outgoing payloads go through [`send`](Device::send).
/// Dropping an open device closes it.
///
/// Closing from another thread interrupts a `pump` blocked in the transport
/// read when the transport provides a [`ReadCanceller`].
pub struct Device<T, H>
where
    T: Transport + 'static,
    H: DeviceHandler,
{
    id: DeviceId,
    label: String,
    shared: Arc<Shared<T, H>>,
    registry: DeviceRegistry,
}

#[cfg(unix)]
impl<H: DeviceHandler> Device<SerialPort, H> {
    /// Open the serial port described by `config`.
    pub fn open(
        registry: &DeviceRegistry,
        config: &DeviceConfig,
        hooks: &SourceHooks,
        handler: H,
    ) -> Result<Self> {
        let serial = config.to_serial_config();
        Self::open_with(registry, hooks, handler, || {
            SerialPort::open_with_config(&serial)
        })
    }
}

impl<T, H> Device<T, H>
where
    T: Transport + 'static,
    H: DeviceHandler,
{
    /// Open a device over the transport produced by `opener`.
    ///
    /// Hooks are validated before `opener` runs. If the register hook fails
    /// the transport is closed again and nothing is added to `registry`.
    pub fn open_with<F>(
        registry: &DeviceRegistry,
        hooks: &SourceHooks,
        handler: H,
        opener: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> adapterlink_transport::Result<T>,
    {
        let (register, remove_hook) = hooks.validate()?;
        let mut transport = opener()?;

        let id = registry.allocate_id();
        let label = transport.label();
        transport.set_next_read_size(HEADER_SIZE);

        let canceller = transport.read_canceller();
        let source = EventSource {
            device: id,
            fd: transport.source(),
            label: label.clone(),
        };
        if let Err(err) = register(&source) {
            warn!(device = %id, label = %label, error = %err, "event source registration failed");
            if let Err(close_err) = transport.close() {
                warn!(device = %id, error = %close_err, "transport close failed");
            }
            return Err(DeviceError::Registration(err));
        }

        let core = DeviceCore {
            id,
            reassembler: Reassembler::new(),
            sender: ChunkedSender::new(),
            handler,
            source,
            remove_hook,
            open: true,
        };
        let shared = Arc::new(Shared {
            id,
            core: Mutex::new(core),
            transport: Mutex::new(transport),
            canceller,
        });
        let entry: Arc<dyn RegisteredDevice> = shared.clone();
        registry.insert(
            DeviceInfo {
                id,
                label: label.clone(),
            },
            entry,
        );

        debug!(device = %id, label = %label, "device opened");
        Ok(Self {
            id,
            label,
            shared,
            registry: registry.clone(),
        })
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    /// Reassembly state of the packet being received.
    pub fn state(&self) -> ReassemblyState {
        self.shared.lock().reassembler.state()
    }

    /// Bytes the transport should deliver next.
    pub fn next_read_size(&self) -> usize {
        self.shared.lock().reassembler.next_read_size()
    }

    /// Run `f` against the device's handler.
    pub fn with_handler<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.shared.lock().handler)
    }

    /// Bound how long the next transport reads may block.
    ///
    /// Waits for a read already in progress to return.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.shared.lock().ensure_open()?;
        self.shared.transport().set_read_timeout(timeout);
        Ok(())
    }

    /// Process one read delivery from the transport.
    ///
    /// A completed packet is handed to the handler and its result returned.
    /// Framing errors are fatal: every later delivery fails until the device
    /// is closed.
    pub fn deliver(&self, bytes: &[u8]) -> Result<()> {
        self.shared.deliver(bytes)
    }

    /// Report an asynchronous read failure from the transport.
    pub fn read_failed(&self, err: TransportError) -> DeviceError {
        warn!(device = %self.id, error = %err, "transport read failed");
        DeviceError::Transport(err)
    }

    /// Read the next delivery directly from the transport and process it.
    ///
    /// Returns the number of bytes delivered; end of stream is
    /// [`DeviceError::Disconnected`]. A read interrupted because the device
    /// was closed meanwhile returns [`DeviceError::Closed`].
    pub fn pump(&self) -> Result<usize> {
        let need = {
            let core = self.shared.lock();
            core.ensure_open()?;
            core.reassembler.next_read_size()
        };
        if need == 0 {
            return Err(FrameError::Desynchronized.into());
        }

        let mut buf = [0u8; MAX_PACKET_SIZE];
        // Only the transport lock is held while blocked.
        let read = self.shared.transport().read(&mut buf[..need]);
        let n = match read {
            Ok(n) => n,
            Err(TransportError::Closed) => return Err(DeviceError::Closed),
            Err(_) if !self.is_open() => return Err(DeviceError::Closed),
            Err(err) => return Err(self.read_failed(err)),
        };
        if n == 0 {
            debug!(device = %self.id, "transport reached end of stream");
            return Err(DeviceError::Disconnected);
        }

        trace!(device = %self.id, bytes = n, "read delivery");
        self.shared.deliver(&buf[..n])?;
        Ok(n)
    }

    /// Send `data` as one or more packets of `packet_type`, returning the packet count.
    pub fn send(&self, packet_type: u8, data: &[u8]) -> Result<usize> {
        let packets = self.shared.send(packet_type, data)?;
        trace!(device = %self.id, packet_type, bytes = data.len(), packets, "payload sent");
        Ok(packets)
    }

    /// The transport closed the link: notify the handler, then close the device.
    ///
    /// Returns the handler's result. Teardown failures are logged.
    pub fn transport_closed(&self) -> Result<()> {
        self.shared.cancel_read();
        let (status, shutdown) = {
            let mut core = self.shared.lock();
            core.ensure_open()?;
            let status = core.handler.on_close();
            (status, self.shared.close_locked(&mut core))
        };
        self.registry.remove(self.id);

        if let Err(err) = shutdown {
            warn!(device = %self.id, error = %err, "teardown after transport close failed");
        }
        status.map_err(DeviceError::from)
    }

    /// Close the device: remove its event source, close the transport and
    /// leave the registry.
    ///
    /// Returns [`DeviceError::Closed`] if the device was already closed by
    /// [`DeviceRegistry::close_all`] or [`transport_closed`](Device::transport_closed).
    pub fn close(self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&self) -> Result<()> {
        let closed = self.shared.teardown();
        match closed {
            Ok(false) => Err(DeviceError::Closed),
            Ok(true) => {
                self.registry.remove(self.id);
                Ok(())
            }
            Err(err) => {
                self.registry.remove(self.id);
                Err(err)
            }
        }
    }
}

impl<T, H> Drop for Device<T, H>
where
    T: Transport + 'static,
    H: DeviceHandler,
{
    fn drop(&mut self) {
        match self.close_inner() {
            Ok(()) | Err(DeviceError::Closed) => {}
            Err(err) => warn!(device = %self.id, error = %err, "close on drop failed"),
        }
    }
}

impl<T, H> fmt::Debug for Device<T, H>
where
    T: Transport + 'static,
    H: DeviceHandler,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}
