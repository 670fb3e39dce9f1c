//! Duplex byte stream providers for request/response device IO.
//!
//! A [`StreamProvider`] supplies a readable and a writable byte channel with a
//! connect/disconnect lifecycle:
//! - Unix domain sockets (Linux/macOS)
//! - TCP sockets (device servers, serial-over-IP bridges)
//! - An in-memory loopback for tests and simulations
//!
//! This is the lowest layer of duplexio. The engine only ever talks to the
//! [`StreamProvider`] and [`InputStream`] traits defined here.

pub mod error;
pub mod memory;
pub mod tcp;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use memory::{memory_pair, MemoryDevice, MemoryProvider};
pub use tcp::{TcpConfig, TcpProvider};
pub use traits::{Available, InputStream, StreamProvider};

#[cfg(unix)]
pub use uds::UnixSocketProvider;
