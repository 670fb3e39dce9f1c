use clap::{Args, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use duplexio_engine::{DirectEngine, EngineConfig};
use duplexio_transport::StreamProvider;
use duplexio_wrap::{EnvelopeWrapper, ProtocolWrapper};

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod exchange;
pub mod inspect;
pub mod poll;
pub mod replay;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one request and read the response.
    Exchange(ExchangeArgs),
    /// Print the records of a session log.
    Inspect(InspectArgs),
    /// Replay a session log and check it is self-consistent.
    Replay(ReplayArgs),
    /// Poll a device periodically through the command queue.
    Poll(PollArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Exchange(args) => exchange::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Replay(args) => replay::run(args, format),
        Command::Poll(args) => poll::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Protocol wrapper applied to requests and responses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum WrapKind {
    /// Payloads travel unmodified.
    #[default]
    None,
    /// Magic, length, payload and XOR checksum.
    Envelope,
}

impl WrapKind {
    pub fn wrapper(self) -> Option<Box<dyn ProtocolWrapper>> {
        match self {
            WrapKind::None => None,
            WrapKind::Envelope => Some(Box::new(EnvelopeWrapper::new())),
        }
    }
}

#[derive(Args, Debug)]
pub struct PayloadArgs {
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex payload, whitespace allowed (e.g. "01 02 ff").
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ExchangeArgs {
    /// Device address: a Unix socket path or tcp://host:port.
    pub target: String,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Read exactly N response bytes instead of draining after --delay.
    #[arg(long, value_name = "N")]
    pub expect: Option<usize>,
    /// Deadline for an exact read (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub timeout: String,
    /// Settle time before draining the response (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub delay: String,
    /// Protocol wrapper.
    #[arg(long, value_enum, default_value_t = WrapKind::None)]
    pub wrap: WrapKind,
    /// Append the exchange to a session log.
    #[arg(long, value_name = "FILE")]
    pub record: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Session log to read.
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Session log to replay.
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct PollArgs {
    /// Device address: a Unix socket path or tcp://host:port.
    pub target: String,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Time between polls (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Settle time before draining each response.
    #[arg(long, default_value = "100ms")]
    pub delay: String,
    /// Exit after N responses.
    #[arg(long)]
    pub count: Option<usize>,
    /// Protocol wrapper.
    #[arg(long, value_enum, default_value_t = WrapKind::None)]
    pub wrap: WrapKind,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Build an engine for `target`. Nothing is opened until `connect`.
pub fn open_target(target: &str) -> CliResult<DirectEngine<Box<dyn StreamProvider>>> {
    let provider: Box<dyn StreamProvider> = match target.strip_prefix("tcp://") {
        Some(addr) => Box::new(duplexio_transport::TcpProvider::new(addr)),
        None => unix_provider(target)?,
    };
    Ok(DirectEngine::with_config(provider, EngineConfig::default()))
}

#[cfg(unix)]
fn unix_provider(path: &str) -> CliResult<Box<dyn StreamProvider>> {
    let provider = duplexio_transport::UnixSocketProvider::new(path)
        .map_err(|err| crate::exit::transport_error("invalid socket path", err))?;
    Ok(Box::new(provider))
}

#[cfg(not(unix))]
fn unix_provider(path: &str) -> CliResult<Box<dyn StreamProvider>> {
    Err(CliError::new(
        USAGE,
        format!("unix sockets are unavailable on this platform: {path}"),
    ))
}

pub fn resolve_payload(args: &PayloadArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(hex) = &args.hex {
        return parse_hex(hex);
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            USAGE,
            format!("hex payload has an odd number of digits: {input}"),
        ));
    }

    digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CliError::new(USAGE, format!("invalid hex payload: {input}")))
        })
        .collect()
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}
