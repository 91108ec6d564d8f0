use std::io::{self, IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use alulink_frame::{hex, Opcode, ResponseFrame};
use alulink_transport::PortInfo;
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
struct ResponseOutput<'a> {
    event: &'static str,
    port: &'a str,
    result: i8,
    zero: bool,
    overflow: bool,
    raw: String,
    timestamp: String,
}

/// Print a decoded response. Only raw output can fail, when stdout is gone.
pub fn print_response(frame: &ResponseFrame, port: &str, format: OutputFormat) -> io::Result<()> {
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                event: "response",
                port,
                result: frame.result,
                zero: frame.zero,
                overflow: frame.overflow,
                raw: hex(&frame.to_bytes()),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["RESULT", "ZERO", "OVERFLOW", "RAW"])
                .add_row(vec![
                    frame.result.to_string(),
                    flag(frame.zero).to_string(),
                    flag(frame.overflow).to_string(),
                    hex(&frame.to_bytes()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "result={} zero={} overflow={}",
                frame.result,
                flag(frame.zero),
                flag(frame.overflow)
            );
        }
        OutputFormat::Raw => return print_raw(&frame.to_bytes()),
    }
    Ok(())
}

#[derive(Serialize)]
struct ChunkOutput<'a> {
    event: &'static str,
    port: &'a str,
    len: usize,
    raw: String,
    timestamp: String,
}

/// Print bytes exactly as one receive poll returned them.
pub fn print_chunk(data: &[u8], port: &str, format: OutputFormat) -> io::Result<()> {
    match format {
        OutputFormat::Json => print_json(&ChunkOutput {
            event: "rx",
            port,
            len: data.len(),
            raw: hex(data),
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!("[RX] {}", hex(data)),
        OutputFormat::Raw => return print_raw(data),
    }
    Ok(())
}

#[derive(Serialize)]
struct SentOutput<'a> {
    event: &'static str,
    port: &'a str,
    kind: &'a str,
    raw: String,
}

/// Confirm what went out on the wire.
pub fn print_sent(kind: &str, bytes: &[u8], port: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&SentOutput {
            event: "tx",
            port,
            kind,
            raw: hex(bytes),
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!("[TX] {} ({kind})", hex(bytes)),
        OutputFormat::Raw => {}
    }
}

#[derive(Serialize)]
struct PortOutput<'a> {
    name: &'a str,
    kind: &'static str,
    vid: Option<String>,
    pid: Option<String>,
    product: Option<&'a str>,
}

pub fn print_ports(ports: &[PortInfo], format: OutputFormat) {
    let rows: Vec<PortOutput<'_>> = ports
        .iter()
        .map(|p| {
            let (vid, pid, product) = match &p.kind {
                alulink_transport::PortKind::Usb { vid, pid, product } => (
                    Some(format!("{vid:04x}")),
                    Some(format!("{pid:04x}")),
                    product.as_deref(),
                ),
                _ => (None, None, None),
            };
            PortOutput {
                name: &p.name,
                kind: p.kind.label(),
                vid,
                pid,
                product,
            }
        })
        .collect();

    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(&rows),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "TYPE", "VID:PID", "PRODUCT"]);
            for row in &rows {
                let ids = match (&row.vid, &row.pid) {
                    (Some(vid), Some(pid)) => format!("{vid}:{pid}"),
                    _ => "-".to_string(),
                };
                table.add_row(vec![
                    row.name.to_string(),
                    row.kind.to_string(),
                    ids,
                    row.product.unwrap_or("-").to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if rows.is_empty() {
                println!("no serial ports found");
            }
            for row in &rows {
                println!("{} ({})", row.name, row.kind);
            }
        }
    }
}

#[derive(Serialize)]
struct OpcodeOutput {
    name: &'static str,
    code: u8,
    binary: String,
}

pub fn print_opcodes(format: OutputFormat) {
    let rows: Vec<OpcodeOutput> = Opcode::ALL
        .iter()
        .map(|op| OpcodeOutput {
            name: op.name(),
            code: op.code(),
            binary: format!("{:06b}", op.code()),
        })
        .collect();

    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(&rows),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OPCODE", "CODE", "BINARY"]);
            for row in &rows {
                table.add_row(vec![
                    row.name.to_string(),
                    format!("0x{:02X}", row.code),
                    row.binary.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &rows {
                println!("{:<4} 0b{}", row.name, row.binary);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) -> io::Result<()> {
    write_raw(&mut io::stdout().lock(), data)
}

fn write_raw<W: Write>(out: &mut W, data: &[u8]) -> io::Result<()> {
    out.write_all(data)?;
    out.flush()
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn flag(set: bool) -> u8 {
    u8::from(set)
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

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn raw_output_writes_bytes_verbatim() {
        let mut out = Vec::new();
        write_raw(&mut out, &[0x05, 0x01]).unwrap();
        assert_eq!(out, vec![0x05, 0x01]);
    }

    #[test]
    fn raw_output_reports_closed_stdout() {
        let err = write_raw(&mut ClosedPipe, &[0x05, 0x01]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
