use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use agentwire_agent::Message;
use agentwire_frame::{ponum_to_dotted, PayloadObject};
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
struct PayloadObjectOutput {
    ponum: String,
    size: usize,
    content: String,
}

#[derive(Serialize)]
struct MessageOutput {
    seqno: u32,
    uri: Option<String>,
    from: Option<String>,
    payload_objects: Vec<PayloadObjectOutput>,
    routing_objects: usize,
    timestamp: String,
}

#[derive(Serialize)]
struct ChildOutput<'a> {
    uri: &'a str,
}

pub fn print_message(msg: &Message, format: OutputFormat) {
    let uri = msg.uri();
    let from = msg.from();
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                seqno: msg.seqno(),
                uri,
                from,
                payload_objects: msg
                    .payload_objects()
                    .iter()
                    .map(|po| PayloadObjectOutput {
                        ponum: ponum_to_dotted(po.ponum()),
                        size: po.len(),
                        content: payload_preview(po.content()),
                    })
                    .collect(),
                routing_objects: msg.routing_objects().len(),
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
                .set_header(vec!["URI", "FROM", "PO", "SIZE", "CONTENT"]);
            for po in msg.payload_objects() {
                table.add_row(vec![
                    uri.clone().unwrap_or_default(),
                    from.clone().unwrap_or_default(),
                    ponum_to_dotted(po.ponum()),
                    po.len().to_string(),
                    payload_preview(po.content()),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "uri={} from={} objects={}",
                uri.as_deref().unwrap_or("-"),
                from.as_deref().unwrap_or("-"),
                msg.payload_objects().len()
            );
            for po in msg.payload_objects() {
                println!("  {}", describe_po(po));
            }
        }
        OutputFormat::Raw => {
            for po in msg.payload_objects() {
                print_raw(po.content());
            }
        }
    }
}

pub fn print_child(uri: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&ChildOutput { uri }).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty | OutputFormat::Raw => println!("{uri}"),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn describe_po(po: &PayloadObject) -> String {
    format!(
        "{} ({} bytes) {}",
        ponum_to_dotted(po.ponum()),
        po.len(),
        payload_preview(po.content())
    )
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
