use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use duplexio_command::{CommandFailure, CommandManager, NamedCommand, QueueConfig};
use duplexio_engine::IoEngine;
use duplexio_wrap::ProtocolWrapper;
use tracing::{error, info, warn};

use crate::cmd::{open_target, parse_duration, resolve_payload, PollArgs};
use crate::exit::{
    command_error, engine_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT,
};
use crate::output::{print_poll_data, OutputFormat};

/// One queued poll: what to send and how to read the answer.
#[derive(Clone)]
struct PollRequest {
    payload: Arc<[u8]>,
    delay: Duration,
    wrapper: Option<Arc<dyn ProtocolWrapper>>,
}

impl PollRequest {
    /// An empty payload only drains; anything else is a delayed exchange.
    fn run(&self, engine: &dyn IoEngine) -> duplexio_engine::Result<Vec<u8>> {
        let wrapper = self.wrapper.as_deref();
        let result = if self.payload.is_empty() {
            engine.read(wrapper)?
        } else {
            engine.write_and_read(&self.payload, self.delay, wrapper)?
        };
        Ok(result.output().map(<[u8]>::to_vec).unwrap_or_default())
    }
}

pub fn run(args: PollArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let request = PollRequest {
        payload: resolve_payload(&args.payload)?.into(),
        delay: parse_duration(&args.delay)?,
        wrapper: args.wrap.wrapper().map(Arc::from),
    };

    let engine = open_target(&args.target)?;
    engine
        .connect()
        .map_err(|err| engine_error("connect failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let manager = CommandManager::with_config(
        Arc::new(engine),
        QueueConfig {
            thread_name_prefix: "duplexio-poll".to_string(),
            ..QueueConfig::default()
        },
    );
    manager
        .start()
        .map_err(|err| command_error("failed starting command worker", err))?;
    info!(device = %args.target, interval_ms = interval.as_millis() as u64, "polling");

    let (results_tx, results_rx) = flume::unbounded::<Vec<u8>>();
    let mut printed = 0usize;
    let mut next_poll = Instant::now();

    while running.load(Ordering::SeqCst) {
        if Instant::now() >= next_poll {
            next_poll += interval;
            let request = request.clone();
            let results = results_tx.clone();
            let accepted = manager
                .enqueue(NamedCommand::new(
                    "poll",
                    move |engine: &dyn IoEngine| -> Result<(), CommandFailure> {
                        let data = request.run(engine)?;
                        results.send(data)?;
                        Ok(())
                    },
                ))
                .map_err(|err| command_error("enqueue failed", err))?;
            if !accepted {
                warn!(pending = manager.pending(), "command queue full, poll skipped");
            }
        }

        // Wake at least every 100ms so ctrl-c is noticed promptly.
        let wait = next_poll
            .saturating_duration_since(Instant::now())
            .min(Duration::from_millis(100));
        match results_rx.recv_timeout(wait) {
            Ok(data) => {
                printed = printed.saturating_add(1);
                print_poll_data(&args.target, printed, &data, format);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    finish(&manager)?;
    info!(responses = printed, "polling stopped");
    Ok(SUCCESS)
}

/// Stop the worker, then disconnect the engine it was using.
///
/// An abandoned worker may still be inside the engine, so the engine is left
/// alone and the poll fails with a timeout.
fn finish(manager: &CommandManager) -> CliResult<()> {
    if !manager.stop() {
        let budget = manager.config().shutdown.budget;
        error!(budget_ms = budget.as_millis() as u64, "poll worker did not stop");
        return Err(CliError::new(
            TIMEOUT,
            format!("poll worker did not stop within {budget:?}"),
        ));
    }
    manager
        .engine()
        .disconnect()
        .map_err(|err| engine_error("disconnect failed", err))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
