//! Well-known packet types.
//!
//! The framing layer never interprets packet types; these are the opcodes the
//! adapter firmware understands. Any other value is free for application use.

/// USB descriptor table.
pub const DESCRIPTORS: u8 = 0;

/// Descriptor index table.
pub const INDEX: u8 = 1;

/// Endpoint configuration table.
pub const ENDPOINTS: u8 = 2;

/// Reset the emulated USB device.
pub const RESET: u8 = 3;

/// Control transfer.
pub const CONTROL: u8 = 4;

/// Stall the pending control transfer.
pub const CONTROL_STALL: u8 = 5;

/// Data from host to device (IN endpoint).
pub const IN: u8 = 6;

/// Data from device to host (OUT endpoint).
pub const OUT: u8 = 7;

/// Firmware debug output.
pub const DEBUG: u8 = 8;

const NAMES: [(u8, &str); 9] = [
    (DESCRIPTORS, "DESCRIPTORS"),
    (INDEX, "INDEX"),
    (ENDPOINTS, "ENDPOINTS"),
    (RESET, "RESET"),
    (CONTROL, "CONTROL"),
    (CONTROL_STALL, "CONTROL_STALL"),
    (IN, "IN"),
    (OUT, "OUT"),
    (DEBUG, "DEBUG"),
];

/// Returns a human-readable name for a packet type.
pub fn packet_type_name(packet_type: u8) -> &'static str {
    NAMES
        .iter()
        .find(|(value, _)| *value == packet_type)
        .map(|(_, name)| *name)
        .unwrap_or("USER")
}

/// All well-known packet types with their names.
pub fn known_packet_types() -> &'static [(u8, &'static str)] {
    &NAMES
}

/// Parse a packet type from a name (case-insensitive), decimal or `0x` hex.
pub fn parse_packet_type(input: &str) -> Option<u8> {
    let input = input.trim();
    if let Some(hex) = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        return u8::from_str_radix(hex, 16).ok();
    }
    if let Ok(value) = input.parse::<u8>() {
        return Some(value);
    }
    NAMES
        .iter()
        .find(|(_, name)| name.eq_ignore_ascii_case(input))
        .map(|(value, _)| *value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for (value, name) in known_packet_types() {
            assert_eq!(packet_type_name(*value), *name);
            assert_eq!(parse_packet_type(name), Some(*value));
        }
    }

    #[test]
    fn unknown_type_is_user() {
        assert_eq!(packet_type_name(200), "USER");
    }

    #[test]
    fn parses_numbers_and_names() {
        assert_eq!(parse_packet_type("debug"), Some(DEBUG));
        assert_eq!(parse_packet_type("7"), Some(OUT));
        assert_eq!(parse_packet_type("0x10"), Some(16));
        assert_eq!(parse_packet_type("256"), None);
        assert_eq!(parse_packet_type("nope"), None);
    }
}
