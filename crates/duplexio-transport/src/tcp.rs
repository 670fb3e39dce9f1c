use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{Available, InputStream, StreamProvider};

const PEEK_BUFFER_SIZE: usize = 1024;

/// Connection options for [`TcpProvider`].
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Upper bound for establishing the connection. `None` uses the OS default.
    pub connect_timeout: Option<Duration>,
    /// Disable Nagle's algorithm so short requests leave immediately.
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(5)),
            nodelay: true,
        }
    }
}

/// A connected TCP socket with a non-blocking availability probe.
#[derive(Debug)]
pub struct TcpSocketStream {
    inner: TcpStream,
}

impl TcpSocketStream {
    pub fn new(inner: TcpStream) -> Self {
        Self { inner }
    }
}

impl Read for TcpSocketStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for TcpSocketStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl InputStream for TcpSocketStream {
    fn poll_available(&mut self) -> std::io::Result<Available> {
        let mut probe = [0u8; PEEK_BUFFER_SIZE];
        self.inner.set_nonblocking(true)?;
        let peeked = self.inner.peek(&mut probe);
        self.inner.set_nonblocking(false)?;

        match peeked {
            Ok(0) => Ok(Available::Eof),
            Ok(n) => Ok(Available::Bytes(n)),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(Available::Idle)
            }
            Err(err) => Err(err),
        }
    }
}

/// TCP stream provider (device servers, serial-over-IP bridges).
#[derive(Debug)]
pub struct TcpProvider {
    target: String,
    config: TcpConfig,
    stream: Option<TcpSocketStream>,
}

impl TcpProvider {
    /// Create a disconnected provider for `target` (`host:port`).
    pub fn new(target: impl Into<String>) -> Self {
        Self::with_config(target, TcpConfig::default())
    }

    /// Create a disconnected provider with explicit options.
    pub fn with_config(target: impl Into<String>, config: TcpConfig) -> Self {
        Self {
            target: target.into(),
            config,
            stream: None,
        }
    }

    /// The configured `host:port` target.
    pub fn target(&self) -> &str {
        &self.target
    }

    fn open(&self) -> std::io::Result<TcpStream> {
        let addrs: Vec<SocketAddr> = self.target.to_socket_addrs()?.collect();
        let mut last_err = std::io::Error::new(
            ErrorKind::AddrNotAvailable,
            "target resolved to no addresses",
        );

        for addr in addrs {
            let attempt = match self.config.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    debug!(%addr, error = %err, "tcp connect attempt failed");
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }
}

impl StreamProvider for TcpProvider {
    fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = self.open().map_err(|e| TransportError::Connect {
            target: self.target.clone(),
            source: e,
        })?;
        stream.set_nodelay(self.config.nodelay)?;
        info!(target = %self.target, "connected to tcp endpoint");
        self.stream = Some(TcpSocketStream::new(stream));
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            match stream.inner.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotConnected => {}
                Err(err) => return Err(err.into()),
            }
            debug!(target = %self.target, "disconnected tcp endpoint");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn input(&mut self) -> Result<&mut dyn InputStream> {
        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => Err(TransportError::NotConnected),
        }
    }

    fn output(&mut self) -> Result<&mut dyn Write> {
        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => Err(TransportError::NotConnected),
        }
    }

    fn transport_name(&self) -> &'static str {
        "tcp"
    }
}
