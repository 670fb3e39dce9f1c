use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use duplexio_transport::{Available, StreamProvider};
use duplexio_wrap::{response_wire_length, unwrap_response, wrap_request, ProtocolWrapper};
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::engine::{unwrap_exact, IoEngine};
use crate::error::{IoError, Result};
use crate::hex::Hex;
use crate::result::{RequestResult, Stopwatch};

/// Tuning knobs for [`DirectEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sleep between availability polls while an exact read is short.
    pub poll_interval: Duration,
    /// Upper bound on a single read call.
    pub read_chunk_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            read_chunk_size: 4 * 1024,
        }
    }
}

/// Engine that talks to a live device through a [`StreamProvider`].
///
/// A single mutex guards the provider; composite operations hold it for their
/// whole duration.
pub struct DirectEngine<P> {
    provider: Mutex<P>,
    config: EngineConfig,
}

impl<P: StreamProvider> DirectEngine<P> {
    /// Create an engine with default configuration. The provider is not
    /// connected until [`IoEngine::connect`] is called.
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, EngineConfig::default())
    }

    /// Create an engine with explicit configuration.
    pub fn with_config(provider: P, config: EngineConfig) -> Self {
        Self {
            provider: Mutex::new(provider),
            config,
        }
    }

    /// Current engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transport_name(&self) -> &'static str {
        self.provider.lock().transport_name()
    }

    pub fn is_connected(&self) -> bool {
        self.provider.lock().is_connected()
    }

    /// Consume the engine and return the provider.
    pub fn into_inner(self) -> P {
        self.provider.into_inner()
    }

    fn write_locked(provider: &mut P, sw: &mut Stopwatch, wire: &[u8]) -> Result<()> {
        let output = provider.output()?;

        sw.tx_start();
        let mut offset = 0usize;
        while offset < wire.len() {
            match output.write(&wire[offset..]) {
                Ok(0) => return Err(IoError::Io(ErrorKind::WriteZero.into())),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(IoError::Io(err)),
            }
        }
        flush_output(output)?;
        sw.tx_end();

        debug!(bytes = wire.len(), data = %Hex(wire), "wrote request");
        Ok(())
    }

    fn drain_locked(&self, provider: &mut P) -> Result<BytesMut> {
        let input = provider.input()?;
        let mut buf = BytesMut::new();
        let mut chunk = vec![0u8; self.config.read_chunk_size.max(1)];

        loop {
            let available = match input.poll_available()? {
                Available::Bytes(n) => n,
                Available::Idle | Available::Eof => break,
            };
            let want = available.min(chunk.len());
            match input.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => return Err(IoError::Io(err)),
            }
        }

        Ok(buf)
    }

    fn read_exact_locked(
        &self,
        provider: &mut P,
        sw: &mut Stopwatch,
        expected: usize,
        timeout: Duration,
    ) -> Result<Bytes> {
        let input = provider.input()?;
        let mut buf = vec![0u8; expected];
        let mut read = 0usize;

        sw.rx_start();
        let started = Instant::now();
        while read < expected {
            let available = input.poll_available()?;
            trace!(read, expected, ?available, "exact read progress");

            match available {
                Available::Bytes(n) => {
                    let want = n.min(expected - read).min(self.config.read_chunk_size.max(1));
                    match input.read(&mut buf[read..read + want]) {
                        Ok(0) => return Err(IoError::IncompleteRead { read, expected }),
                        Ok(n) => read += n,
                        Err(err) if err.kind() == ErrorKind::Interrupted => {}
                        Err(err) if err.kind() == ErrorKind::WouldBlock => {}
                        Err(err) => return Err(IoError::Io(err)),
                    }
                    if read == expected {
                        break;
                    }
                }
                Available::Eof => return Err(IoError::IncompleteRead { read, expected }),
                Available::Idle => {}
            }

            if started.elapsed() > timeout {
                return Err(IoError::Timeout {
                    read,
                    expected,
                    timeout,
                });
            }
            if available == Available::Idle {
                std::thread::sleep(self.config.poll_interval);
            }
        }
        sw.rx_end();

        debug!(
            bytes = expected,
            elapsed = ?started.elapsed(),
            data = %Hex(&buf),
            "read exact response"
        );
        Ok(Bytes::from(buf))
    }

    fn flush_all_locked(&self, provider: &mut P) -> Result<()> {
        flush_output(provider.output()?)?;

        let discarded = self.drain_locked(provider)?;
        if !discarded.is_empty() {
            debug!(
                bytes = discarded.len(),
                data = %Hex(&discarded),
                "discarded pending input"
            );
        }
        debug!("flushed streams");
        Ok(())
    }

    fn opportunistic_read_locked(
        &self,
        provider: &mut P,
        sw: &mut Stopwatch,
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<Bytes> {
        sw.rx_start();
        let wire = self.drain_locked(provider)?;
        sw.rx_end();

        debug!(bytes = wire.len(), data = %Hex(&wire), "read available bytes");
        Ok(unwrap_response(wrapper, &wire)?)
    }

    fn exact_read_locked(
        &self,
        provider: &mut P,
        sw: &mut Stopwatch,
        out: &mut [u8],
        timeout: Duration,
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<Bytes> {
        let wire_len = response_wire_length(wrapper, out.len());
        let wire = self.read_exact_locked(provider, sw, wire_len, timeout)?;
        unwrap_exact(wrapper, &wire, out)
    }
}

fn flush_output(output: &mut dyn Write) -> Result<()> {
    loop {
        match output.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(IoError::Io(err)),
        }
    }
}

impl<P: StreamProvider> IoEngine for DirectEngine<P> {
    fn connect(&self) -> Result<()> {
        let mut provider = self.provider.lock();
        if !provider.is_connected() {
            provider.connect()?;
            info!(transport = provider.transport_name(), "connected");
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        let mut provider = self.provider.lock();
        if provider.is_connected() {
            provider.disconnect()?;
            info!(transport = provider.transport_name(), "disconnected");
        }
        Ok(())
    }

    fn write(
        &self,
        payload: &[u8],
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<RequestResult> {
        let mut sw = Stopwatch::start();
        let wire = wrap_request(wrapper, payload)?;

        let mut provider = self.provider.lock();
        Self::write_locked(&mut provider, &mut sw, &wire)?;
        Ok(sw.finish(None))
    }

    fn read(&self, wrapper: Option<&dyn ProtocolWrapper>) -> Result<RequestResult> {
        let mut sw = Stopwatch::start();
        let mut provider = self.provider.lock();
        let output = self.opportunistic_read_locked(&mut provider, &mut sw, wrapper)?;
        Ok(sw.finish(Some(output)))
    }

    fn read_exact(
        &self,
        out: &mut [u8],
        timeout: Duration,
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<RequestResult> {
        let mut sw = Stopwatch::start();
        let mut provider = self.provider.lock();
        let output = self.exact_read_locked(&mut provider, &mut sw, out, timeout, wrapper)?;
        Ok(sw.finish(Some(output)))
    }

    fn write_and_read(
        &self,
        payload: &[u8],
        delay: Duration,
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<RequestResult> {
        let mut sw = Stopwatch::start();
        let wire = wrap_request(wrapper, payload)?;

        let mut provider = self.provider.lock();
        self.flush_all_locked(&mut provider)?;
        Self::write_locked(&mut provider, &mut sw, &wire)?;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let output = self.opportunistic_read_locked(&mut provider, &mut sw, wrapper)?;
        Ok(sw.finish(Some(output)))
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

        let mut provider = self.provider.lock();
        self.flush_all_locked(&mut provider)?;
        Self::write_locked(&mut provider, &mut sw, &wire)?;
        let output = self.exact_read_locked(&mut provider, &mut sw, out, timeout, wrapper)?;
        Ok(sw.finish(Some(output)))
    }

    fn flush_all(&self) -> Result<()> {
        let mut provider = self.provider.lock();
        self.flush_all_locked(&mut provider)
    }
}
