use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

use duplexio_engine::{parse_log, IoEngine, LogRecord, ReplayEngine};
use tracing::debug;

use crate::cmd::ReplayArgs;
use crate::exit::{engine_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_replay_summary, OutputFormat};

pub fn run(args: ReplayArgs, format: OutputFormat) -> CliResult<i32> {
    let context = format!("replay of {} failed", args.path.display());
    let file = File::open(&args.path)
        .map_err(|err| io_error(&format!("failed opening {}", args.path.display()), err))?;
    let records = parse_log(BufReader::new(file)).map_err(|err| engine_error(&context, err))?;

    let engine = ReplayEngine::open(&args.path).map_err(|err| engine_error(&context, err))?;
    for record in &records {
        replay_record(&engine, record).map_err(|err| engine_error(&context, err))?;
    }

    if !engine.is_exhausted() {
        return Err(CliError::new(
            DATA_INVALID,
            format!("{context}: trailing data after last record"),
        ));
    }

    print_replay_summary(
        &args.path.display().to_string(),
        engine.records_replayed(),
        format,
    );
    Ok(SUCCESS)
}

/// Drive `engine` with the call that produced `record`, at wire level.
fn replay_record(engine: &dyn IoEngine, record: &LogRecord) -> duplexio_engine::Result<()> {
    match record {
        LogRecord::Write(outgoing) => {
            engine.write(outgoing, None)?;
        }
        LogRecord::WriteAndRead { outgoing, incoming } => {
            let result = engine.write_and_read(outgoing, Duration::ZERO, None)?;
            debug!(
                expected = incoming.len(),
                received = result.output().map_or(0, <[u8]>::len),
                "replayed exchange"
            );
        }
        LogRecord::Read(incoming) => {
            let mut out = vec![0u8; incoming.len()];
            engine.read_exact(&mut out, Duration::ZERO, None)?;
        }
    }
    Ok(())
}
