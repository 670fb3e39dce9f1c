use std::io::{IsTerminal, Write};
use std::time::Duration;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use duplexio_engine::{Hex, LogRecord, RequestResult};
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
struct ExchangeOutput<'a> {
    target: &'a str,
    request_size: usize,
    response_size: usize,
    response_hex: String,
    response_text: String,
    tx_us: u128,
    rx_us: u128,
    total_us: u128,
}

pub fn print_exchange(
    target: &str,
    request_size: usize,
    result: &RequestResult,
    format: OutputFormat,
) {
    let response = result.output().unwrap_or_default();
    match format {
        OutputFormat::Json => {
            let out = ExchangeOutput {
                target,
                request_size,
                response_size: response.len(),
                response_hex: Hex(response).to_string(),
                response_text: payload_preview(response),
                tx_us: result.tx_duration().as_micros(),
                rx_us: result.rx_duration().as_micros(),
                total_us: result.total_duration().as_micros(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SENT", "RECEIVED", "TX", "RX", "TOTAL", "RESPONSE"])
                .add_row(vec![
                    request_size.to_string(),
                    response.len().to_string(),
                    format_duration(result.tx_duration()),
                    format_duration(result.rx_duration()),
                    format_duration(result.total_duration()),
                    Hex(response).to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "target={} sent={} received={} total={} response={}",
                target,
                request_size,
                response.len(),
                format_duration(result.total_duration()),
                payload_preview(response)
            );
        }
        OutputFormat::Raw => print_raw(response),
    }
}

#[derive(Serialize)]
struct RecordOutput {
    index: usize,
    kind: String,
    outgoing_size: Option<usize>,
    outgoing_hex: Option<String>,
    incoming_size: Option<usize>,
    incoming_hex: Option<String>,
}

impl RecordOutput {
    fn new(index: usize, record: &LogRecord) -> Self {
        Self {
            index,
            kind: record.kind().to_string(),
            outgoing_size: record.outgoing().map(<[u8]>::len),
            outgoing_hex: record.outgoing().map(|bytes| Hex(bytes).to_string()),
            incoming_size: record.incoming().map(<[u8]>::len),
            incoming_hex: record.incoming().map(|bytes| Hex(bytes).to_string()),
        }
    }
}

pub fn print_records(records: &[LogRecord], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out: Vec<RecordOutput> = records
                .iter()
                .enumerate()
                .map(|(index, record)| RecordOutput::new(index, record))
                .collect();
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "KIND", "OUTGOING", "INCOMING"]);
            for (index, record) in records.iter().enumerate() {
                table.add_row(vec![
                    index.to_string(),
                    record.kind().to_string(),
                    record.outgoing().map(|b| Hex(b).to_string()).unwrap_or_default(),
                    record.incoming().map(|b| Hex(b).to_string()).unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (index, record) in records.iter().enumerate() {
                let mut line = format!("#{index} {}", record.kind());
                if let Some(outgoing) = record.outgoing() {
                    line.push_str(&format!(" out=[{}]", Hex(outgoing)));
                }
                if let Some(incoming) = record.incoming() {
                    line.push_str(&format!(" in=[{}]", Hex(incoming)));
                }
                println!("{line}");
            }
        }
        OutputFormat::Raw => {
            for record in records {
                if let Some(incoming) = record.incoming() {
                    print_raw(incoming);
                }
            }
        }
    }
}

#[derive(Serialize)]
struct ReplayOutput<'a> {
    log: &'a str,
    records_replayed: usize,
    consistent: bool,
}

pub fn print_replay_summary(log: &str, records_replayed: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ReplayOutput {
            log,
            records_replayed,
            consistent: true,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["LOG", "RECORDS", "CONSISTENT"])
                .add_row(vec![log.to_string(), records_replayed.to_string(), "yes".to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("log={log} records={records_replayed} consistent=true");
        }
    }
}

#[derive(Serialize)]
struct PollOutput<'a> {
    sequence: usize,
    size: usize,
    hex: String,
    text: String,
    target: &'a str,
}

pub fn print_poll_data(target: &str, sequence: usize, data: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&PollOutput {
            sequence,
            size: data.len(),
            hex: Hex(data).to_string(),
            text: payload_preview(data),
            target,
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!(
                "#{sequence} size={} data={}",
                data.len(),
                payload_preview(data)
            );
        }
        OutputFormat::Raw => print_raw(data),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_millis(1) {
        format!("{}us", duration.as_micros())
    } else {
        format!("{:.1}ms", duration.as_secs_f64() * 1000.0)
    }
}
