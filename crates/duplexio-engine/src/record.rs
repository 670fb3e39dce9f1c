use std::io::Write;
use std::time::Duration;

use bytes::Bytes;
use duplexio_wrap::{response_wire_length, unwrap_response, wrap_request, ProtocolWrapper};
use parking_lot::Mutex;
use tracing::debug;

use crate::engine::{unwrap_exact, IoEngine};
use crate::error::Result;
use crate::log::LogRecord;
use crate::result::RequestResult;

/// Decorator that logs the wire traffic of an inner engine.
///
/// Wrapping happens here rather than in the inner engine so the log holds the
/// exact bytes exchanged with the device. A record is appended only after the
/// inner call succeeded, and the sink is flushed after every record. The sink
/// lock is held across the inner call so records appear in call order.
pub struct RecordingEngine<E, W> {
    inner: E,
    sink: Mutex<W>,
}

impl<E: IoEngine, W: Write + Send> RecordingEngine<E, W> {
    pub fn new(inner: E, sink: W) -> Self {
        Self {
            inner,
            sink: Mutex::new(sink),
        }
    }

    /// Consume the recorder and return the inner engine and the sink.
    pub fn into_parts(self) -> (E, W) {
        (self.inner, self.sink.into_inner())
    }

    fn append(sink: &mut W, record: &LogRecord) -> Result<()> {
        record.write_to(sink)?;
        sink.flush()?;
        debug!(kind = %record.kind(), "recorded exchange");
        Ok(())
    }
}

fn output_bytes(result: &RequestResult) -> Bytes {
    result
        .output()
        .map(Bytes::copy_from_slice)
        .unwrap_or_default()
}

impl<E: IoEngine, W: Write + Send> IoEngine for RecordingEngine<E, W> {
    fn connect(&self) -> Result<()> {
        self.inner.connect()
    }

    fn disconnect(&self) -> Result<()> {
        let mut sink = self.sink.lock();
        self.inner.disconnect()?;
        sink.flush()?;
        Ok(())
    }

    fn write(
        &self,
        payload: &[u8],
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<RequestResult> {
        let wire = wrap_request(wrapper, payload)?;

        let mut sink = self.sink.lock();
        let result = self.inner.write(&wire, None)?;
        Self::append(&mut sink, &LogRecord::Write(wire))?;
        Ok(result)
    }

    fn read(&self, wrapper: Option<&dyn ProtocolWrapper>) -> Result<RequestResult> {
        let mut sink = self.sink.lock();
        let result = self.inner.read(None)?;
        let incoming = output_bytes(&result);
        Self::append(&mut sink, &LogRecord::Read(incoming.clone()))?;
        drop(sink);

        let payload = unwrap_response(wrapper, &incoming)?;
        Ok(result.rewrap_output(Some(payload)))
    }

    fn read_exact(
        &self,
        out: &mut [u8],
        timeout: Duration,
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<RequestResult> {
        let mut wire = vec![0u8; response_wire_length(wrapper, out.len())];

        let mut sink = self.sink.lock();
        let result = self.inner.read_exact(&mut wire, timeout, None)?;
        Self::append(&mut sink, &LogRecord::Read(Bytes::copy_from_slice(&wire)))?;
        drop(sink);

        let payload = unwrap_exact(wrapper, &wire, out)?;
        Ok(result.rewrap_output(Some(payload)))
    }

    fn write_and_read(
        &self,
        payload: &[u8],
        delay: Duration,
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<RequestResult> {
        let outgoing = wrap_request(wrapper, payload)?;

        let mut sink = self.sink.lock();
        let result = self.inner.write_and_read(&outgoing, delay, None)?;
        let incoming = output_bytes(&result);
        Self::append(
            &mut sink,
            &LogRecord::WriteAndRead {
                outgoing,
                incoming: incoming.clone(),
            },
        )?;
        drop(sink);

        let payload = unwrap_response(wrapper, &incoming)?;
        Ok(result.rewrap_output(Some(payload)))
    }

    fn write_and_read_exact(
        &self,
        payload: &[u8],
        out: &mut [u8],
        timeout: Duration,
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<RequestResult> {
        let outgoing = wrap_request(wrapper, payload)?;
        let mut wire = vec![0u8; response_wire_length(wrapper, out.len())];

        let mut sink = self.sink.lock();
        let result = self
            .inner
            .write_and_read_exact(&outgoing, &mut wire, timeout, None)?;
        Self::append(
            &mut sink,
            &LogRecord::WriteAndRead {
                outgoing,
                incoming: Bytes::copy_from_slice(&wire),
            },
        )?;
        drop(sink);

        let payload = unwrap_exact(wrapper, &wire, out)?;
        Ok(result.rewrap_output(Some(payload)))
    }

    fn flush_all(&self) -> Result<()> {
        self.inner.flush_all()
    }
}
