//! Text format shared by [`RecordingEngine`](crate::RecordingEngine) and
//! [`ReplayEngine`](crate::ReplayEngine).
//!
//! Every record is a tag line followed by one or two standard-alphabet padded
//! Base64 lines, each terminated by CRLF:
//!
//! ```text
//! # Write:\r\n
//! <outgoing>\r\n
//! # Write and read:\r\n
//! <outgoing>\r\n
//! <incoming>\r\n
//! # Read:\r\n
//! <incoming>\r\n
//! ```
//!
//! Payloads are wire bytes, i.e. after wrapping. Any other content is a
//! format error.

use std::fmt;
use std::io::{BufRead, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;

use crate::error::{IoError, Result};

pub const WRITE_TAG: &str = "# Write:";
pub const WRITE_AND_READ_TAG: &str = "# Write and read:";
pub const READ_TAG: &str = "# Read:";

const LINE_END: &str = "\r\n";
const END_OF_LOG: &str = "<end of log>";

/// Which operation a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Write,
    WriteAndRead,
    Read,
}

impl RecordKind {
    /// Tag line that introduces a record of this kind.
    pub fn tag(self) -> &'static str {
        match self {
            RecordKind::Write => WRITE_TAG,
            RecordKind::WriteAndRead => WRITE_AND_READ_TAG,
            RecordKind::Read => READ_TAG,
        }
    }

    fn from_tag(line: &str) -> Option<Self> {
        match line {
            WRITE_TAG => Some(RecordKind::Write),
            WRITE_AND_READ_TAG => Some(RecordKind::WriteAndRead),
            READ_TAG => Some(RecordKind::Read),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordKind::Write => "write",
            RecordKind::WriteAndRead => "write-and-read",
            RecordKind::Read => "read",
        })
    }
}

/// One logged exchange, in wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Write(Bytes),
    WriteAndRead { outgoing: Bytes, incoming: Bytes },
    Read(Bytes),
}

impl LogRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            LogRecord::Write(_) => RecordKind::Write,
            LogRecord::WriteAndRead { .. } => RecordKind::WriteAndRead,
            LogRecord::Read(_) => RecordKind::Read,
        }
    }

    /// Bytes sent to the device, if any.
    pub fn outgoing(&self) -> Option<&[u8]> {
        match self {
            LogRecord::Write(outgoing) | LogRecord::WriteAndRead { outgoing, .. } => {
                Some(&outgoing[..])
            }
            LogRecord::Read(_) => None,
        }
    }

    /// Bytes received from the device, if any.
    pub fn incoming(&self) -> Option<&[u8]> {
        match self {
            LogRecord::Read(incoming) | LogRecord::WriteAndRead { incoming, .. } => {
                Some(&incoming[..])
            }
            LogRecord::Write(_) => None,
        }
    }

    /// Append this record to `sink` in log format. Does not flush.
    pub fn write_to<W: Write + ?Sized>(&self, sink: &mut W) -> std::io::Result<()> {
        write!(sink, "{}{LINE_END}", self.kind().tag())?;
        if let Some(outgoing) = self.outgoing() {
            write!(sink, "{}{LINE_END}", STANDARD.encode(outgoing))?;
        }
        if let Some(incoming) = self.incoming() {
            write!(sink, "{}{LINE_END}", STANDARD.encode(incoming))?;
        }
        Ok(())
    }
}

/// Sequential reader over a log.
///
/// Also usable as an iterator of `Result<LogRecord>`; iteration stops at the
/// first error.
pub struct LogReader<R> {
    inner: R,
    line_number: usize,
    failed: bool,
}

impl<R: BufRead> LogReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line_number: 0,
            failed: false,
        }
    }

    /// Number of lines consumed so far.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Whether every line of the log has been consumed.
    pub fn is_at_end(&mut self) -> std::io::Result<bool> {
        Ok(self.inner.fill_buf()?.is_empty())
    }

    /// Next line without its terminator, or `None` at end of log.
    ///
    /// A line that is not UTF-8 is a format error against `expected`.
    fn next_line(&mut self, expected: &'static str) -> Result<Option<String>> {
        let mut raw = Vec::new();
        if self.inner.read_until(b'\n', &mut raw)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        if raw.ends_with(b"\n") {
            raw.pop();
            if raw.ends_with(b"\r") {
                raw.pop();
            }
        }
        match String::from_utf8(raw) {
            Ok(line) => Ok(Some(line)),
            Err(err) => {
                self.failed = true;
                let line = String::from_utf8_lossy(err.as_bytes()).into_owned();
                Err(self.format_error(expected, Some(line)))
            }
        }
    }

    fn format_error(&self, expected: &'static str, line: Option<String>) -> IoError {
        match line {
            Some(line) => IoError::ReplayFormat {
                expected,
                line,
                line_number: self.line_number,
            },
            None => IoError::ReplayFormat {
                expected,
                line: END_OF_LOG.to_string(),
                line_number: self.line_number + 1,
            },
        }
    }

    /// Consume the next line, which must be the tag for `kind`.
    pub fn expect_tag(&mut self, kind: RecordKind) -> Result<()> {
        match self.next_line(kind.tag())? {
            Some(line) if line == kind.tag() => Ok(()),
            other => {
                self.failed = true;
                Err(self.format_error(kind.tag(), other))
            }
        }
    }

    /// Consume and decode the next Base64 payload line.
    pub fn payload_line(&mut self) -> Result<Bytes> {
        let line = match self.next_line("base64 payload")? {
            Some(line) => line,
            None => {
                self.failed = true;
                return Err(self.format_error("base64 payload", None));
            }
        };
        match STANDARD.decode(line.as_bytes()) {
            Ok(decoded) => Ok(Bytes::from(decoded)),
            Err(_) => {
                self.failed = true;
                Err(self.format_error("base64 payload", Some(line)))
            }
        }
    }

    /// Read the next record of any kind, or `None` at a clean end of log.
    pub fn next_record(&mut self) -> Result<Option<LogRecord>> {
        let line = match self.next_line("record tag")? {
            Some(line) => line,
            None => return Ok(None),
        };
        let Some(kind) = RecordKind::from_tag(&line) else {
            self.failed = true;
            return Err(self.format_error("record tag", Some(line)));
        };

        let record = match kind {
            RecordKind::Write => LogRecord::Write(self.payload_line()?),
            RecordKind::WriteAndRead => LogRecord::WriteAndRead {
                outgoing: self.payload_line()?,
                incoming: self.payload_line()?,
            },
            RecordKind::Read => LogRecord::Read(self.payload_line()?),
        };
        Ok(Some(record))
    }
}

impl<R: BufRead> Iterator for LogReader<R> {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Parse a complete log into its records.
pub fn parse_log<R: BufRead>(reader: R) -> Result<Vec<LogRecord>> {
    LogReader::new(reader).collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn encode(records: &[LogRecord]) -> String {
        let mut buf = Vec::new();
        for record in records {
            record.write_to(&mut buf).unwrap();
        }
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn write_to_uses_tags_base64_and_crlf() {
        let text = encode(&[
            LogRecord::Write(Bytes::from_static(b"hi")),
            LogRecord::WriteAndRead {
                outgoing: Bytes::from_static(&[0x01]),
                incoming: Bytes::from_static(&[0xff, 0x00]),
            },
            LogRecord::Read(Bytes::new()),
        ]);

        assert_eq!(
            text,
            "# Write:\r\naGk=\r\n# Write and read:\r\nAQ==\r\n/wA=\r\n# Read:\r\n\r\n"
        );
    }

    #[test]
    fn parse_log_reads_back_every_record() {
        let records = vec![
            LogRecord::Write(Bytes::from_static(b"cmd")),
            LogRecord::WriteAndRead {
                outgoing: Bytes::from_static(b"q"),
                incoming: Bytes::from_static(b"answer"),
            },
            LogRecord::Read(Bytes::from_static(b"tail")),
        ];
        let parsed = parse_log(Cursor::new(encode(&records))).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn accepts_bare_lf_line_endings() {
        let parsed = parse_log(Cursor::new("# Read:\naGk=\n")).unwrap();
        assert_eq!(parsed, vec![LogRecord::Read(Bytes::from_static(b"hi"))]);
    }

    #[test]
    fn unknown_tag_is_format_error() {
        let err = parse_log(Cursor::new("# Erase:\r\naGk=\r\n")).unwrap_err();
        match err {
            IoError::ReplayFormat {
                expected,
                line,
                line_number,
            } => {
                assert_eq!(expected, "record tag");
                assert_eq!(line, "# Erase:");
                assert_eq!(line_number, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_base64_is_format_error() {
        let err = parse_log(Cursor::new("# Write:\r\n!!notbase64\r\n")).unwrap_err();
        assert!(matches!(
            err,
            IoError::ReplayFormat {
                expected: "base64 payload",
                line_number: 2,
                ..
            }
        ));
    }

    #[test]
    fn non_utf8_lines_are_format_errors() {
        let err = parse_log(Cursor::new(&b"\xff# Write:\r\n"[..])).unwrap_err();
        assert!(matches!(
            err,
            IoError::ReplayFormat {
                expected: "record tag",
                line_number: 1,
                ..
            }
        ));

        let err = parse_log(Cursor::new(&b"# Write:\r\n\xff\xfe\r\n"[..])).unwrap_err();
        match err {
            IoError::ReplayFormat {
                expected,
                line,
                line_number,
            } => {
                assert_eq!(expected, "base64 payload");
                assert_eq!(line_number, 2);
                assert_eq!(line, "\u{fffd}\u{fffd}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn replaying_a_non_utf8_tag_is_a_format_error() {
        let mut reader = LogReader::new(Cursor::new(&b"# Wr\xc3ite:\r\n"[..]));
        let err = reader.expect_tag(RecordKind::Write).unwrap_err();
        assert!(matches!(
            err,
            IoError::ReplayFormat {
                expected: "# Write:",
                ..
            }
        ));
    }

    #[test]
    fn truncated_record_is_format_error() {
        let err = parse_log(Cursor::new("# Write and read:\r\nAQ==\r\n")).unwrap_err();
        match err {
            IoError::ReplayFormat { line, .. } => assert_eq!(line, "<end of log>"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn expect_tag_reports_end_of_log() {
        let mut reader = LogReader::new(Cursor::new(""));
        let err = reader.expect_tag(RecordKind::Read).unwrap_err();
        match err {
            IoError::ReplayFormat { expected, line, .. } => {
                assert_eq!(expected, READ_TAG);
                assert_eq!(line, "<end of log>");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn iterator_stops_after_first_error() {
        let reader = LogReader::new(Cursor::new("bogus\r\n# Read:\r\naGk=\r\n"));
        let items: Vec<_> = reader.collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[test]
    fn record_accessors() {
        let record = LogRecord::WriteAndRead {
            outgoing: Bytes::from_static(b"a"),
            incoming: Bytes::from_static(b"b"),
        };
        assert_eq!(record.kind(), RecordKind::WriteAndRead);
        assert_eq!(record.outgoing(), Some(&b"a"[..]));
        assert_eq!(record.incoming(), Some(&b"b"[..]));
        assert_eq!(record.kind().to_string(), "write-and-read");
        assert_eq!(LogRecord::Write(Bytes::new()).incoming(), None);
    }
}
