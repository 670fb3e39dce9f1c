use std::time::Duration;

use duplexio_transport::TransportError;
use duplexio_wrap::WrapError;

/// Errors surfaced by [`IoEngine`](crate::IoEngine) operations.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Transport-level failure while acquiring or using the stream.
    #[error("stream error: {0}")]
    Stream(#[from] TransportError),

    /// An I/O error occurred while reading or writing bytes.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The deadline passed before the exact length was collected.
    #[error("read {read} of {expected} bytes before exceeding timeout of {timeout:?}")]
    Timeout {
        read: usize,
        expected: usize,
        timeout: Duration,
    },

    /// The stream ended before the exact length was collected.
    #[error("stream ended after {read} of {expected} bytes")]
    IncompleteRead { read: usize, expected: usize },

    /// The unwrapped payload length differs from the requested length.
    #[error("unwrapped payload of {actual} bytes does not match expected length {expected}")]
    LengthMismatch { actual: usize, expected: usize },

    /// The protocol wrapper rejected a payload.
    #[error("protocol wrapper error: {0}")]
    Wrap(#[from] WrapError),

    /// A replay log line did not have the expected form.
    #[error("replay log line {line_number}: expected {expected}, found {line:?}")]
    ReplayFormat {
        expected: &'static str,
        line: String,
        line_number: usize,
    },

    /// A replayed command differs from the recorded one.
    #[error("command {requested:02X?} does not match recorded command {recorded:02X?}")]
    ReplayMismatch {
        requested: Vec<u8>,
        recorded: Vec<u8>,
    },
}

pub type Result<T> = std::result::Result<T, IoError>;
