use std::fs::OpenOptions;

use duplexio_engine::{IoEngine, RecordingEngine, RequestResult};
use duplexio_wrap::ProtocolWrapper;
use tracing::info;

use crate::cmd::{open_target, parse_duration, resolve_payload, ExchangeArgs};
use crate::exit::{engine_error, io_error, CliResult, SUCCESS};
use crate::output::{print_exchange, OutputFormat};

pub fn run(args: ExchangeArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let delay = parse_duration(&args.delay)?;
    let payload = resolve_payload(&args.payload)?;
    let wrapper = args.wrap.wrapper();

    let direct = open_target(&args.target)?;
    let engine: Box<dyn IoEngine> = match &args.record {
        Some(path) => {
            let log = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))?;
            info!(log = %path.display(), "recording session");
            Box::new(RecordingEngine::new(direct, log))
        }
        None => Box::new(direct),
    };

    engine
        .connect()
        .map_err(|err| engine_error("connect failed", err))?;

    let result = exchange(
        engine.as_ref(),
        &payload,
        args.expect,
        timeout,
        delay,
        wrapper.as_deref(),
    );
    let closed = engine.disconnect();

    let result = result.map_err(|err| engine_error("exchange failed", err))?;
    closed.map_err(|err| engine_error("disconnect failed", err))?;

    print_exchange(&args.target, payload.len(), &result, format);
    Ok(SUCCESS)
}

fn exchange(
    engine: &dyn IoEngine,
    payload: &[u8],
    expect: Option<usize>,
    timeout: std::time::Duration,
    delay: std::time::Duration,
    wrapper: Option<&dyn ProtocolWrapper>,
) -> duplexio_engine::Result<RequestResult> {
    match expect {
        Some(len) => {
            let mut out = vec![0u8; len];
            engine.write_and_read_exact(payload, &mut out, timeout, wrapper)
        }
        None => engine.write_and_read(payload, delay, wrapper),
    }
}
