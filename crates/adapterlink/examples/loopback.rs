//! In-memory loopback: a simulated peripheral answers a descriptor upload.
//!
//! Run with:
//!   cargo run --example loopback
//!
//! Against real hardware, use the CLI instead:
//!   cargo run --features cli -- send /dev/ttyUSB0 --type DEBUG --data ping --wait

use adapterlink::device::{read_handler, Device, DeviceRegistry, SourceHooks};
use adapterlink::frame::usb::DescriptorIndex;
use adapterlink::frame::{packet_type_name, Packet, PacketRef, DEBUG, DESCRIPTORS, INDEX};
use adapterlink::transport::MemoryTransport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = DeviceRegistry::new();
    let (transport, peripheral) = MemoryTransport::pair();

    let device = Device::open_with(
        &registry,
        &SourceHooks::detached(),
        read_handler(|packet: PacketRef<'_>| {
            eprintln!(
                "received {} ({} bytes): {}",
                packet_type_name(packet.packet_type),
                packet.len(),
                String::from_utf8_lossy(packet.payload)
            );
            Ok(())
        }),
        move || Ok(transport),
    )?;

    // A 600-byte descriptor blob goes out as three packets.
    let descriptors = vec![0x12u8; 600];
    let sent = device.send(DESCRIPTORS, &descriptors)?;
    let index = DescriptorIndex {
        offset: 0,
        value: 0x0100,
        index: 0,
        length: 18,
    };
    device.send(INDEX, &DescriptorIndex::encode_table(&[index])?)?;
    eprintln!(
        "sent {sent} descriptor packets, {} writes total",
        peripheral.writes().len()
    );

    // The peripheral answers with a debug line, split across two deliveries.
    let reply = Packet::new(DEBUG, b"descriptors loaded".to_vec())?.to_wire();
    peripheral.push_inbound(&reply[..7]);
    peripheral.push_inbound(&reply[7..]);
    while device.pump().is_ok() {}

    eprintln!("open devices: {:?}", registry.devices());
    device.close()?;
    eprintln!("open devices after close: {}", registry.len());
    Ok(())
}
