use adapterlink_frame::known_packet_types;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use crate::cmd::TypesArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct TypeEntry {
    value: u8,
    name: &'static str,
}

pub fn run(_args: TypesArgs, format: OutputFormat) -> CliResult<i32> {
    let entries: Vec<TypeEntry> = known_packet_types()
        .iter()
        .map(|&(value, name)| TypeEntry { value, name })
        .collect();

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["VALUE", "NAME"]);
            for entry in &entries {
                table.add_row(vec![format!("0x{:02x}", entry.value), entry.name.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for entry in &entries {
                println!("{:>3} {}", entry.value, entry.name);
            }
        }
    }

    Ok(SUCCESS)
}
