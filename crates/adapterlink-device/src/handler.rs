use adapterlink_frame::PacketRef;

/// Failure reported by a [`DeviceHandler`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Caller-side callbacks of an open device.
///
/// The handler is owned by the device and doubles as the caller's context.
/// Errors are propagated unchanged to whoever drove the event.
pub trait DeviceHandler: Send + 'static {
    /// A complete packet was reassembled.
    ///
    /// The payload borrows the device's reassembly buffer; copy it with
    /// [`PacketRef::to_owned_packet`] to keep it.
    fn on_read(&mut self, packet: PacketRef<'_>) -> HandlerResult;

    /// The transport accepted `transferred` bytes of a packet.
    fn on_write_complete(&mut self, transferred: usize) -> HandlerResult {
        let _ = transferred;
        Ok(())
    }

    /// The transport closed the link.
    fn on_close(&mut self) -> HandlerResult {
        Ok(())
    }
}

/// Handler built from a read closure; write completions and closes are accepted silently.
pub struct FnHandler<F> {
    on_read: F,
}

/// Wrap a closure as a [`DeviceHandler`].
pub fn read_handler<F>(on_read: F) -> FnHandler<F>
where
    F: FnMut(PacketRef<'_>) -> HandlerResult + Send + 'static,
{
    FnHandler { on_read }
}

impl<F> DeviceHandler for FnHandler<F>
where
    F: FnMut(PacketRef<'_>) -> HandlerResult + Send + 'static,
{
    fn on_read(&mut self, packet: PacketRef<'_>) -> HandlerResult {
        (self.on_read)(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_handler_forwards_reads() {
        let mut handler = read_handler(|packet: PacketRef<'_>| {
            if packet.packet_type == 0xFF {
                return Err(HandlerError::new("rejected"));
            }
            Ok(())
        });

        let ok = PacketRef {
            packet_type: 1,
            payload: b"ok",
        };
        assert!(handler.on_read(ok).is_ok());

        let rejected = PacketRef {
            packet_type: 0xFF,
            payload: b"",
        };
        let err = handler.on_read(rejected).unwrap_err();
        assert_eq!(err.message(), "rejected");
    }

    #[test]
    fn default_callbacks_accept() {
        let mut handler = read_handler(|_packet: PacketRef<'_>| Ok(()));
        assert!(handler.on_write_complete(10).is_ok());
        assert!(handler.on_close().is_ok());
    }
}
