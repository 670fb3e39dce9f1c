//! Synchronous, timeout-bounded request/response IO over a duplex stream.
//!
//! [`IoEngine`] is the capability every caller talks to. Three engines
//! implement it:
//! - [`DirectEngine`]: live IO through a [`StreamProvider`](duplexio_transport::StreamProvider)
//! - [`RecordingEngine`]: decorator that logs every exchange in wire bytes
//! - [`ReplayEngine`]: plays a recorded log back in place of a device
//!
//! Exact-length reads either fill the caller's buffer completely or fail
//! with a timeout or an incomplete-read error. Never a short buffer.

pub mod direct;
pub mod engine;
pub mod error;
pub mod hex;
pub mod log;
pub mod record;
pub mod replay;
pub mod result;

pub use direct::{DirectEngine, EngineConfig};
pub use engine::IoEngine;
pub use error::{IoError, Result};
pub use hex::Hex;
pub use log::{parse_log, LogReader, LogRecord, RecordKind};
pub use record::RecordingEngine;
pub use replay::ReplayEngine;
pub use result::RequestResult;
