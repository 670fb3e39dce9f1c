//! In-process loopback transport.
//!
//! [`memory_pair`] returns a [`MemoryProvider`] for the engine side and a
//! [`MemoryDevice`] handle that plays the device: it injects response bytes,
//! closes the input, and inspects whatever the engine wrote.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{Available, InputStream, StreamProvider};

/// Produces the device's reply to the bytes flushed by the engine.
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

#[derive(Default)]
struct Shared {
    inbound: VecDeque<u8>,
    closed: bool,
    written: BytesMut,
    unflushed: BytesMut,
    flushes: usize,
    connects: usize,
    responder: Option<Responder>,
}

/// Create a connected-on-demand loopback provider and its device handle.
pub fn memory_pair() -> (MemoryProvider, MemoryDevice) {
    let shared = Arc::new(Mutex::new(Shared::default()));
    let provider = MemoryProvider {
        connected: false,
        input: MemoryInput {
            shared: Arc::clone(&shared),
        },
        output: MemoryOutput {
            shared: Arc::clone(&shared),
        },
    };
    (provider, MemoryDevice { shared })
}

/// Engine-side half of the loopback.
pub struct MemoryProvider {
    connected: bool,
    input: MemoryInput,
    output: MemoryOutput,
}

/// Readable half handed out by [`MemoryProvider::input`].
pub struct MemoryInput {
    shared: Arc<Mutex<Shared>>,
}

/// Writable half handed out by [`MemoryProvider::output`].
pub struct MemoryOutput {
    shared: Arc<Mutex<Shared>>,
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut shared = self.shared.lock();
        if shared.inbound.is_empty() {
            if shared.closed || buf.is_empty() {
                return Ok(0);
            }
            return Err(std::io::Error::from(ErrorKind::WouldBlock));
        }

        let n = buf.len().min(shared.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(shared.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl InputStream for MemoryInput {
    fn poll_available(&mut self) -> std::io::Result<Available> {
        let shared = self.shared.lock();
        Ok(match (shared.inbound.len(), shared.closed) {
            (0, true) => Available::Eof,
            (0, false) => Available::Idle,
            (n, _) => Available::Bytes(n),
        })
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut shared = self.shared.lock();
        shared.written.extend_from_slice(buf);
        shared.unflushed.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut shared = self.shared.lock();
        shared.flushes += 1;
        if shared.unflushed.is_empty() {
            return Ok(());
        }

        let request = shared.unflushed.split().freeze();
        if let Some(mut responder) = shared.responder.take() {
            let reply = responder(&request);
            trace!(request = request.len(), reply = reply.len(), "memory device replied");
            shared.inbound.extend(reply);
            shared.responder = Some(responder);
        }
        Ok(())
    }
}

impl StreamProvider for MemoryProvider {
    fn connect(&mut self) -> Result<()> {
        if !self.connected {
            self.connected = true;
            self.input.shared.lock().connects += 1;
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn input(&mut self) -> Result<&mut dyn InputStream> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        Ok(&mut self.input)
    }

    fn output(&mut self) -> Result<&mut dyn Write> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        Ok(&mut self.output)
    }

    fn transport_name(&self) -> &'static str {
        "memory"
    }
}

/// Device-side handle of the loopback. Cheap to clone and `Send`.
#[derive(Clone)]
pub struct MemoryDevice {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryDevice {
    /// Make `bytes` available to the engine immediately.
    pub fn push(&self, bytes: &[u8]) {
        self.shared.lock().inbound.extend(bytes.iter().copied());
    }

    /// Feed `chunks` from a background thread, sleeping `interval` before each.
    /// When `close_after` is set, the input is closed after the last chunk.
    pub fn feed(
        &self,
        chunks: Vec<Vec<u8>>,
        interval: Duration,
        close_after: bool,
    ) -> JoinHandle<()> {
        let device = self.clone();
        std::thread::spawn(move || {
            for chunk in chunks {
                std::thread::sleep(interval);
                device.push(&chunk);
            }
            if close_after {
                device.close();
            }
        })
    }

    /// Reply to every flushed request with the output of `responder`.
    pub fn set_responder(&self, responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) {
        self.shared.lock().responder = Some(Box::new(responder));
    }

    /// Signal end-of-stream once buffered bytes are consumed.
    pub fn close(&self) {
        self.shared.lock().closed = true;
    }

    /// All bytes the engine has written so far.
    pub fn written(&self) -> Bytes {
        Bytes::copy_from_slice(&self.shared.lock().written)
    }

    /// Take and clear the bytes the engine has written so far.
    pub fn take_written(&self) -> Bytes {
        self.shared.lock().written.split().freeze()
    }

    /// Bytes injected but not yet read by the engine.
    pub fn pending_input(&self) -> usize {
        self.shared.lock().inbound.len()
    }

    /// Number of flushes the engine issued.
    pub fn flush_count(&self) -> usize {
        self.shared.lock().flushes
    }

    /// Number of disconnected-to-connected transitions.
    pub fn connect_count(&self) -> usize {
        self.shared.lock().connects
    }
}
