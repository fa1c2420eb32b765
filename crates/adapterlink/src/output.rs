use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use adapterlink_frame::{packet_type_name, Packet};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    packet_type: u8,
    type_name: &'static str,
    length: usize,
    payload: String,
    payload_hex: String,
    port: &'a str,
    timestamp: String,
}

pub fn print_packet(packet: &Packet, port: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                packet_type: packet.packet_type(),
                type_name: packet_type_name(packet.packet_type()),
                length: packet.len(),
                payload: payload_preview(packet.payload()),
                payload_hex: hex_string(packet.payload()),
                port,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "NAME", "LENGTH", "PORT", "PAYLOAD"])
                .add_row(vec![
                    format!("0x{:02x}", packet.packet_type()),
                    packet_type_name(packet.packet_type()).to_string(),
                    packet.len().to_string(),
                    port.to_string(),
                    payload_preview(packet.payload()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type=0x{:02x} ({}) length={} port={} payload={}",
                packet.packet_type(),
                packet_type_name(packet.packet_type()),
                packet.len(),
                port,
                payload_preview(packet.payload())
            );
        }
        OutputFormat::Raw => {
            print_raw(packet.payload());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn hex_string(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_shows_text_and_hides_binary() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert_eq!(payload_preview(&[0x00, 0xff]), "<binary 2 bytes>");
        assert_eq!(payload_preview(b""), "");
    }

    #[test]
    fn hex_is_lowercase_and_unseparated() {
        assert_eq!(hex_string(&[0x0a, 0xff, 0x00]), "0aff00");
    }
}
