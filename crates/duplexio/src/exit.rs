use std::fmt;
use std::io;

use duplexio_command::CommandError;
use duplexio_engine::IoError;
use duplexio_transport::TransportError;

// Process exit codes. 124 matches timeout(1).
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe => TRANSPORT_ERROR,
        io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn engine_error(context: &str, err: IoError) -> CliError {
    match err {
        IoError::Stream(err) => transport_error(context, err),
        IoError::Io(err) => io_error(context, err),
        IoError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        IoError::IncompleteRead { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        IoError::LengthMismatch { .. }
        | IoError::Wrap(_)
        | IoError::ReplayFormat { .. }
        | IoError::ReplayMismatch { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

pub fn command_error(context: &str, err: CommandError) -> CliError {
    match err {
        CommandError::Spawn(err) => io_error(context, err),
        CommandError::NotRunning => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn engine_errors_map_to_exit_codes() {
        let timeout = IoError::Timeout {
            read: 1,
            expected: 4,
            timeout: Duration::from_millis(10),
        };
        assert_eq!(engine_error("read", timeout).code, TIMEOUT);

        let incomplete = IoError::IncompleteRead {
            read: 1,
            expected: 4,
        };
        assert_eq!(engine_error("read", incomplete).code, FAILURE);

        let mismatch = IoError::ReplayMismatch {
            requested: vec![1],
            recorded: vec![2],
        };
        assert_eq!(engine_error("replay", mismatch).code, DATA_INVALID);

        let closed = IoError::Stream(TransportError::NotConnected);
        assert_eq!(engine_error("write", closed).code, TRANSPORT_ERROR);
    }

    #[test]
    fn connect_failures_are_transport_errors() {
        let err = TransportError::Connect {
            target: "/tmp/missing.sock".to_string(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let cli = transport_error("connect failed", err);
        assert_eq!(cli.code, TRANSPORT_ERROR);
        assert!(cli.message.starts_with("connect failed: "));
    }
}
