use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{Result, WrapError};
use crate::wrapper::ProtocolWrapper;

/// Envelope header: magic (2) + length (2).
pub const HEADER_SIZE: usize = 4;

/// Envelope trailer: XOR checksum (1).
pub const TRAILER_SIZE: usize = 1;

/// Total framing overhead added to every payload.
pub const OVERHEAD: usize = HEADER_SIZE + TRAILER_SIZE;

/// Default magic bytes (0xA5 0x5A).
pub const DEFAULT_MAGIC: [u8; 2] = [0xA5, 0x5A];

/// Largest payload the 2-byte length field can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Magic + length + payload + checksum framing.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬─────────────────┬──────────────┐
/// │ Magic (2B)   │ Length    │ Payload         │ Checksum     │
/// │ 0xA5 0x5A    │ (2B LE)   │ (Length bytes)  │ (1B XOR)     │
/// └──────────────┴───────────┴─────────────────┴──────────────┘
/// ```
///
/// The checksum is the XOR of the length bytes and every payload byte.
/// Requests and responses share the layout, so the wrapper is symmetric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeWrapper {
    magic: [u8; 2],
}

impl EnvelopeWrapper {
    pub fn new() -> Self {
        Self::with_magic(DEFAULT_MAGIC)
    }

    pub fn with_magic(magic: [u8; 2]) -> Self {
        Self { magic }
    }

    pub fn magic(&self) -> [u8; 2] {
        self.magic
    }

    fn encode(&self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        if payload.len() > MAX_PAYLOAD {
            return Err(WrapError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        let len = payload.len() as u16;
        dst.reserve(OVERHEAD + payload.len());
        dst.put_slice(&self.magic);
        dst.put_u16_le(len);
        dst.put_slice(payload);
        dst.put_u8(checksum(len, payload));
        Ok(())
    }

    fn decode(&self, src: &[u8]) -> Result<Bytes> {
        if src.len() < OVERHEAD {
            return Err(WrapError::Truncated {
                len: src.len(),
                min: OVERHEAD,
            });
        }

        let actual_magic = [src[0], src[1]];
        if actual_magic != self.magic {
            return Err(WrapError::InvalidMagic {
                expected: self.magic,
                actual: actual_magic,
            });
        }

        let declared = u16::from_le_bytes([src[2], src[3]]);
        let payload = &src[HEADER_SIZE..src.len() - TRAILER_SIZE];
        if payload.len() != declared as usize {
            return Err(WrapError::LengthMismatch {
                declared: declared as usize,
                actual: payload.len(),
            });
        }

        let expected = checksum(declared, payload);
        let actual = src[src.len() - 1];
        if expected != actual {
            return Err(WrapError::ChecksumMismatch { expected, actual });
        }

        trace!(len = payload.len(), "unwrapped envelope");
        Ok(Bytes::copy_from_slice(payload))
    }
}

impl Default for EnvelopeWrapper {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolWrapper for EnvelopeWrapper {
    fn wrap_request(&self, raw: &[u8]) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        self.encode(raw, &mut dst)?;
        Ok(dst.freeze())
    }

    fn wrapped_request_length(&self, len: usize) -> usize {
        OVERHEAD + len
    }

    fn unwrap_response(&self, wrapped: &[u8]) -> Result<Bytes> {
        self.decode(wrapped)
    }

    fn wrapped_response_length(&self, len: usize) -> usize {
        OVERHEAD + len
    }
}

fn checksum(len: u16, payload: &[u8]) -> u8 {
    let [lo, hi] = len.to_le_bytes();
    payload.iter().fold(lo ^ hi, |acc, byte| acc ^ byte)
}
