use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::{Duration, Instant};

use bytes::Bytes;
use duplexio_wrap::{unwrap_response, wrap_request, ProtocolWrapper};
use parking_lot::Mutex;
use tracing::debug;

use crate::engine::{unwrap_exact, IoEngine};
use crate::error::{IoError, Result};
use crate::log::{LogReader, RecordKind};
use crate::result::{RequestResult, Stopwatch};

struct ReplayState<R> {
    reader: LogReader<R>,
    replayed: usize,
}

/// Engine that plays back a recorded log instead of talking to a device.
///
/// Every call must match the next record in the log: same operation kind and,
/// for writes, byte-identical wire output. No IO or sleeping takes place;
/// receive timestamps are synthesized from the requested delay or timeout.
pub struct ReplayEngine<R> {
    state: Mutex<ReplayState<R>>,
}

impl ReplayEngine<BufReader<File>> {
    /// Replay the log stored at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead + Send> ReplayEngine<R> {
    pub fn new(log: R) -> Self {
        Self {
            state: Mutex::new(ReplayState {
                reader: LogReader::new(log),
                replayed: 0,
            }),
        }
    }

    /// Number of records consumed so far.
    pub fn records_replayed(&self) -> usize {
        self.state.lock().replayed
    }

    /// Whether the whole log has been consumed. Read errors count as exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.state.lock().reader.is_at_end().unwrap_or(true)
    }

    /// Consume the next tag and, for writes, verify the outgoing bytes.
    fn next_outgoing(
        state: &mut ReplayState<R>,
        kind: RecordKind,
        requested: &[u8],
    ) -> Result<()> {
        state.reader.expect_tag(kind)?;
        let recorded = state.reader.payload_line()?;
        if recorded.as_ref() != requested {
            return Err(IoError::ReplayMismatch {
                requested: requested.to_vec(),
                recorded: recorded.to_vec(),
            });
        }
        Ok(())
    }

    fn finish_record(state: &mut ReplayState<R>, kind: RecordKind) {
        state.replayed += 1;
        debug!(record = state.replayed, %kind, "replayed record");
    }
}

/// Mark a receive phase lasting `span` starting now.
fn synthesize_rx(sw: &mut Stopwatch, span: Duration) {
    let rx_start = Instant::now();
    sw.rx_start_at(rx_start);
    sw.rx_end_at(rx_start + span);
}

fn mark_tx(sw: &mut Stopwatch) {
    sw.tx_start();
    sw.tx_end();
}

impl<R: BufRead + Send> IoEngine for ReplayEngine<R> {
    fn connect(&self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    fn write(
        &self,
        payload: &[u8],
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<RequestResult> {
        let mut sw = Stopwatch::start();
        let wire = wrap_request(wrapper, payload)?;

        let mut state = self.state.lock();
        Self::next_outgoing(&mut state, RecordKind::Write, &wire)?;
        mark_tx(&mut sw);
        Self::finish_record(&mut state, RecordKind::Write);
        Ok(sw.finish(None))
    }

    fn read(&self, wrapper: Option<&dyn ProtocolWrapper>) -> Result<RequestResult> {
        let mut sw = Stopwatch::start();

        let mut state = self.state.lock();
        state.reader.expect_tag(RecordKind::Read)?;
        let incoming = state.reader.payload_line()?;
        synthesize_rx(&mut sw, Duration::ZERO);
        Self::finish_record(&mut state, RecordKind::Read);
        drop(state);

        let payload = unwrap_response(wrapper, &incoming)?;
        Ok(sw.finish(Some(payload)))
    }

    fn read_exact(
        &self,
        out: &mut [u8],
        timeout: Duration,
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<RequestResult> {
        let mut sw = Stopwatch::start();

        let mut state = self.state.lock();
        state.reader.expect_tag(RecordKind::Read)?;
        let incoming = state.reader.payload_line()?;
        synthesize_rx(&mut sw, timeout / 20);
        Self::finish_record(&mut state, RecordKind::Read);
        drop(state);

        let payload = unwrap_exact(wrapper, &incoming, out)?;
        Ok(sw.finish(Some(payload)))
    }

    fn write_and_read(
        &self,
        payload: &[u8],
        delay: Duration,
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<RequestResult> {
        let mut sw = Stopwatch::start();
        let wire = wrap_request(wrapper, payload)?;

        let mut state = self.state.lock();
        Self::next_outgoing(&mut state, RecordKind::WriteAndRead, &wire)?;
        let incoming = state.reader.payload_line()?;
        mark_tx(&mut sw);
        synthesize_rx(&mut sw, delay / 2);
        Self::finish_record(&mut state, RecordKind::WriteAndRead);
        drop(state);

        let payload: Bytes = unwrap_response(wrapper, &incoming)?;
        Ok(sw.finish(Some(payload)))
    }

    fn write_and_read_exact(
        &self,
        payload: &[u8],
        out: &mut [u8],
        timeout: Duration,
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<RequestResult> {
        let mut sw = Stopwatch::start();
        let wire = wrap_request(wrapper, payload)?;

        let mut state = self.state.lock();
        Self::next_outgoing(&mut state, RecordKind::WriteAndRead, &wire)?;
        let incoming = state.reader.payload_line()?;
        mark_tx(&mut sw);
        synthesize_rx(&mut sw, timeout / 20);
        Self::finish_record(&mut state, RecordKind::WriteAndRead);
        drop(state);

        let payload = unwrap_exact(wrapper, &incoming, out)?;
        Ok(sw.finish(Some(payload)))
    }

    fn flush_all(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use duplexio_wrap::EnvelopeWrapper;

    use super::*;

    const LOG: &str = "# Write:\r\nAQI=\r\n# Write and read:\r\ncQ==\r\ncmVwbHk=\r\n# Read:\r\nAAEC\r\n";

    #[test]
    fn replays_records_in_order() {
        let engine = ReplayEngine::new(Cursor::new(LOG));

        engine.write(&[1, 2], None).unwrap();
        let reply = engine
            .write_and_read(b"q", Duration::from_millis(100), None)
            .unwrap();
        assert_eq!(reply.output(), Some(&b"reply"[..]));

        let mut out = [0u8; 3];
        engine
            .read_exact(&mut out, Duration::from_secs(1), None)
            .unwrap();
        assert_eq!(out, [0, 1, 2]);

        assert_eq!(engine.records_replayed(), 3);
        assert!(engine.is_exhausted());
    }

    #[test]
    fn synthesizes_receive_timestamps() {
        let engine = ReplayEngine::new(Cursor::new(LOG));
        engine.write(&[1, 2], None).unwrap();

        let started = Instant::now();
        let delay = Duration::from_secs(10);
        let result = engine.write_and_read(b"q", delay, None).unwrap();

        assert!(started.elapsed() < Duration::from_secs(1), "replay must not sleep");
        assert_eq!(result.rx_duration(), delay / 2);
        assert!(result.request_end() >= result.rx_end());

        let timeout = Duration::from_secs(2);
        let mut out = [0u8; 3];
        let result = engine.read_exact(&mut out, timeout, None).unwrap();
        assert_eq!(result.rx_duration(), timeout / 20);
    }

    #[test]
    fn mismatched_command_fails() {
        let engine = ReplayEngine::new(Cursor::new(LOG));

        let err = engine.write(&[1, 3], None).unwrap_err();
        match err {
            IoError::ReplayMismatch {
                requested,
                recorded,
            } => {
                assert_eq!(requested, vec![1, 3]);
                assert_eq!(recorded, vec![1, 2]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(engine.records_replayed(), 0);
    }

    #[test]
    fn wrong_operation_kind_fails() {
        let engine = ReplayEngine::new(Cursor::new(LOG));

        let err = engine.read(None).unwrap_err();
        assert!(matches!(
            err,
            IoError::ReplayFormat {
                expected: "# Read:",
                line_number: 1,
                ..
            }
        ));
    }

    #[test]
    fn end_of_log_is_format_error() {
        let engine = ReplayEngine::new(Cursor::new(""));
        assert!(engine.is_exhausted());

        let err = engine.write(b"x", None).unwrap_err();
        match err {
            IoError::ReplayFormat { line, .. } => assert_eq!(line, "<end of log>"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn exact_read_checks_recorded_length() {
        let engine = ReplayEngine::new(Cursor::new("# Read:\r\nAAEC\r\n"));
        let mut out = [0u8; 4];
        let err = engine
            .read_exact(&mut out, Duration::from_secs(1), None)
            .unwrap_err();
        assert!(matches!(
            err,
            IoError::LengthMismatch {
                actual: 3,
                expected: 4
            }
        ));
    }

    #[test]
    fn wrapper_applies_to_outgoing_and_incoming() {
        let wrapper = EnvelopeWrapper::new();
        let wire = wrapper.wrap_request(&[0x10]).unwrap();
        let mut log = Vec::new();
        crate::log::LogRecord::WriteAndRead {
            outgoing: wire.clone(),
            incoming: wire,
        }
        .write_to(&mut log)
        .unwrap();

        let engine = ReplayEngine::new(Cursor::new(log));
        let mut out = [0u8; 1];
        engine
            .write_and_read_exact(&[0x10], &mut out, Duration::from_secs(1), Some(&wrapper))
            .unwrap();
        assert_eq!(out, [0x10]);
    }

    #[test]
    fn lifecycle_calls_are_no_ops() {
        let engine = ReplayEngine::new(Cursor::new(LOG));
        engine.connect().unwrap();
        engine.flush_all().unwrap();
        engine.disconnect().unwrap();
        assert_eq!(engine.records_replayed(), 0);
        assert!(!engine.is_exhausted());
    }
}
