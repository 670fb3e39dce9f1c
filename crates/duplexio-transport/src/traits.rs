use std::io::{Read, Write};

use crate::error::Result;

/// Progress signal reported by [`InputStream::poll_available`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Available {
    /// At least this many bytes can be read without blocking.
    Bytes(usize),
    /// Nothing buffered right now; the stream is still open.
    Idle,
    /// The peer closed the stream; no more bytes will arrive.
    Eof,
}

/// The readable half of a duplex stream.
///
/// `poll_available` must never block. It is the only progress indicator the
/// engine relies on, so implementations backed by a real descriptor should
/// report bytes already buffered by the OS.
pub trait InputStream: Read + Send {
    fn poll_available(&mut self) -> std::io::Result<Available>;
}

/// Supplies a readable and a writable byte channel with a connect/disconnect
/// lifecycle.
///
/// `connect` and `disconnect` are idempotent. Accessing either half while
/// disconnected fails with [`TransportError::NotConnected`](crate::TransportError::NotConnected).
pub trait StreamProvider: Send {
    /// Open the underlying channel. No-op when already connected.
    fn connect(&mut self) -> Result<()>;

    /// Close the underlying channel. No-op when already disconnected.
    fn disconnect(&mut self) -> Result<()>;

    /// Whether the provider currently holds an open channel.
    fn is_connected(&self) -> bool;

    /// Borrow the readable half.
    fn input(&mut self) -> Result<&mut dyn InputStream>;

    /// Borrow the writable half.
    fn output(&mut self) -> Result<&mut dyn Write>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

impl<P: StreamProvider + ?Sized> StreamProvider for Box<P> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn input(&mut self) -> Result<&mut dyn InputStream> {
        (**self).input()
    }

    fn output(&mut self) -> Result<&mut dyn Write> {
        (**self).output()
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}
