//! Timeout-bounded request/response IO for byte-stream devices.
//!
//! duplexio talks to devices that answer requests over a duplex byte stream
//! (serial bridges, Unix sockets, TCP device servers). Exact-length reads
//! either complete or fail within a deadline, sessions can be recorded and
//! replayed without the device, and a bounded command queue serializes work
//! from many producers onto one worker thread.
//!
//! # Crate Structure
//!
//! - [`transport`]: stream providers (Unix sockets, TCP, in-memory loopback)
//! - [`wrap`]: pluggable protocol wrappers applied to every request/response
//! - [`engine`]: the IO engine, recorder and replayer
//! - [`command`]: command queue and graceful-shutdown worker (behind `command` feature)

/// Re-export transport types.
pub mod transport {
    pub use duplexio_transport::*;
}

/// Re-export protocol wrapper types.
pub mod wrap {
    pub use duplexio_wrap::*;
}

/// Re-export engine types.
pub mod engine {
    pub use duplexio_engine::*;
}

/// Re-export command queue types (requires `command` feature).
#[cfg(feature = "command")]
pub mod command {
    pub use duplexio_command::*;
}
