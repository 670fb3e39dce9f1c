use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, WrapError};
use crate::wrapper::ProtocolWrapper;

/// Prepends a fixed prefix to requests and strips it from responses.
///
/// Typical for devices that expect an address or command-class byte in front
/// of every message and echo it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixWrapper {
    prefix: Bytes,
}

impl PrefixWrapper {
    pub fn new(prefix: impl AsRef<[u8]>) -> Self {
        Self {
            prefix: Bytes::copy_from_slice(prefix.as_ref()),
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }
}

impl ProtocolWrapper for PrefixWrapper {
    fn wrap_request(&self, raw: &[u8]) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.prefix.len() + raw.len());
        dst.put_slice(&self.prefix);
        dst.put_slice(raw);
        Ok(dst.freeze())
    }

    fn wrapped_request_length(&self, len: usize) -> usize {
        self.prefix.len() + len
    }

    fn unwrap_response(&self, wrapped: &[u8]) -> Result<Bytes> {
        let min = self.prefix.len();
        if wrapped.len() < min {
            return Err(WrapError::Truncated {
                len: wrapped.len(),
                min,
            });
        }
        if wrapped[..min] != self.prefix[..] {
            return Err(WrapError::PrefixMismatch {
                expected: self.prefix.to_vec(),
                actual: wrapped[..min].to_vec(),
            });
        }
        Ok(Bytes::copy_from_slice(&wrapped[min..]))
    }

    fn wrapped_response_length(&self, len: usize) -> usize {
        self.prefix.len() + len
    }
}
