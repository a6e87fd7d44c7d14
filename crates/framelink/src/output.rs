use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framelink_client::{ConnectionHealthSnapshot, LinkMetricsSnapshot};
use framelink_frame::{wire_checksum, Frame, ResponsePayload};
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
struct FrameOutput<'a> {
    version: u8,
    msg_type: &'a str,
    msg_id: u16,
    seq: u16,
    payload_len: usize,
    payload_hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_text: Option<&'a str>,
    timestamp: String,
}

impl<'a> FrameOutput<'a> {
    fn new(frame: &'a Frame) -> Self {
        let header = frame.header();
        Self {
            version: header.version,
            msg_type: header.msg_type.name(),
            msg_id: header.msg_id,
            seq: header.seq,
            payload_len: frame.payload().len(),
            payload_hex: hex::encode(frame.payload()),
            payload_text: printable_text(frame.payload()),
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_frame(frame: &Frame, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&FrameOutput::new(frame)),
        OutputFormat::Table => {
            let mut table = new_table(vec!["TYPE", "MSG ID", "SEQ", "SIZE", "PAYLOAD"]);
            table.add_row(vec![
                frame.msg_type().to_string(),
                frame.msg_id().to_string(),
                frame.seq().to_string(),
                frame.payload().len().to_string(),
                payload_preview(frame.payload()),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{frame} payload={}", payload_preview(frame.payload()));
        }
        OutputFormat::Raw => print_raw(frame.payload()),
    }
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    command_id: u16,
    status: String,
    device_error_code: u16,
    data_len: usize,
    data_hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_text: Option<&'a str>,
}

pub fn print_response(response: &ResponsePayload, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ResponseOutput {
            command_id: response.command_id,
            status: response.status.to_string(),
            device_error_code: response.device_error_code,
            data_len: response.data.len(),
            data_hex: hex::encode(&response.data),
            data_text: printable_text(&response.data),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COMMAND", "STATUS", "DEVICE CODE", "DATA"]);
            table.add_row(vec![
                format!("{:#06x}", response.command_id),
                response.status.to_string(),
                response.device_error_code.to_string(),
                payload_preview(&response.data),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command={:#06x} status={} device_code={} data={}",
                response.command_id,
                response.status,
                response.device_error_code,
                payload_preview(&response.data)
            );
        }
        OutputFormat::Raw => print_raw(&response.data),
    }
}

#[derive(Serialize)]
struct StatsOutput<'a> {
    health: &'a ConnectionHealthSnapshot,
    metrics: &'a LinkMetricsSnapshot,
}

pub fn print_stats(
    health: &ConnectionHealthSnapshot,
    metrics: &LinkMetricsSnapshot,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(&StatsOutput { health, metrics }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["METRIC", "VALUE"]);
            for (name, value) in stats_rows(health, metrics) {
                table.add_row(vec![name.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (name, value) in stats_rows(health, metrics) {
                println!("{name}: {value}");
            }
        }
    }
}

fn stats_rows(
    health: &ConnectionHealthSnapshot,
    metrics: &LinkMetricsSnapshot,
) -> Vec<(&'static str, String)> {
    vec![
        ("state", health.state.to_string()),
        ("consecutive_timeouts", health.consecutive_timeouts.to_string()),
        (
            "last_seen_age_ms",
            health
                .last_seen_age
                .map_or_else(|| "-".to_string(), |age| age.as_millis().to_string()),
        ),
        (
            "last_error",
            health.last_error.clone().unwrap_or_else(|| "-".to_string()),
        ),
        ("rx_bytes", metrics.rx_bytes.to_string()),
        ("tx_bytes", metrics.tx_bytes.to_string()),
        ("rx_frames", metrics.rx_frames.to_string()),
        ("tx_frames", metrics.tx_frames.to_string()),
        ("crc_failures", metrics.crc_failures.to_string()),
        ("framing_errors", metrics.framing_errors.to_string()),
        ("seq_misses", metrics.seq_misses.to_string()),
        ("command_timeouts", metrics.command_timeouts.to_string()),
        ("telemetry_dropped", metrics.telemetry_dropped.to_string()),
        ("pending_requests", metrics.pending_requests.to_string()),
        ("rx_bytes_per_sec", format!("{:.1}", metrics.rx_bytes_per_sec)),
        ("tx_bytes_per_sec", format!("{:.1}", metrics.tx_bytes_per_sec)),
        ("rx_frames_per_sec", format!("{:.1}", metrics.rx_frames_per_sec)),
    ]
}

#[derive(Serialize)]
struct WireOutput {
    wire_len: usize,
    crc: Option<u16>,
    wire_hex: String,
}

impl WireOutput {
    fn new(wire: &[u8]) -> Self {
        Self {
            wire_len: wire.len(),
            crc: wire_checksum(wire),
            wire_hex: hex::encode(wire),
        }
    }
}

/// Print an encoded frame. `Raw` writes the wire bytes themselves.
pub fn print_wire(wire: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&WireOutput::new(wire)),
        OutputFormat::Table => {
            let out = WireOutput::new(wire);
            let crc = out
                .crc
                .map_or_else(|| "-".to_string(), |crc| format!("{crc:#06x}"));
            let mut table = new_table(vec!["SIZE", "CRC", "WIRE"]);
            table.add_row(vec![out.wire_len.to_string(), crc, out.wire_hex]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", hex::encode(wire)),
        OutputFormat::Raw => print_raw(wire),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn printable_text(payload: &[u8]) -> Option<&str> {
    std::str::from_utf8(payload)
        .ok()
        .filter(|text| !text.chars().any(|c| c.is_control() && c != '\n' && c != '\t'))
}

fn payload_preview(payload: &[u8]) -> String {
    if payload.is_empty() {
        return "-".to_string();
    }
    match printable_text(payload) {
        Some(text) => text.to_string(),
        None => hex::encode(payload),
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
    use framelink_frame::FrameCodec;

    use super::*;

    #[test]
    fn preview_prefers_text_and_falls_back_to_hex() {
        assert_eq!(payload_preview(b"temp=21"), "temp=21");
        assert_eq!(payload_preview(&[0x00, 0xff]), "00ff");
        assert_eq!(payload_preview(b""), "-");
    }

    #[test]
    fn frame_output_carries_header_fields() {
        let frame = Frame::command(b"ping".to_vec())
            .expect("frame")
            .with_msg_id(7)
            .with_seq(3);
        let out = FrameOutput::new(&frame);
        let json = serde_json::to_value(&out).expect("json");
        assert_eq!(json["msg_type"], "COMMAND");
        assert_eq!(json["msg_id"], 7);
        assert_eq!(json["seq"], 3);
        assert_eq!(json["payload_hex"], "70696e67");
        assert_eq!(json["payload_text"], "ping");
    }

    #[test]
    fn wire_output_reports_trailing_crc() {
        let wire = FrameCodec::new().encode(&Frame::alive(1));
        let json = serde_json::to_value(WireOutput::new(&wire)).expect("json");
        let trailer = u16::from_le_bytes([wire[wire.len() - 2], wire[wire.len() - 1]]);
        assert_eq!(json["wire_len"], 12);
        assert_eq!(json["crc"], trailer);

        let json = serde_json::to_value(WireOutput::new(&wire[..3])).expect("json");
        assert!(json["crc"].is_null());
    }
}
