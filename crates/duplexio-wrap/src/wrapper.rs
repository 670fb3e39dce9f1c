use std::fmt;

use bytes::Bytes;

use crate::error::Result;

/// A stateless protocol transform applied to every request and response.
///
/// Implementations must satisfy, for every byte sequence `b`:
/// - `unwrap_response(wrap_request(b)) == b`;
/// - `wrap_request(b).len() == wrapped_request_length(b.len())`;
/// - a response produced by the device for an `n`-byte logical payload is
///   exactly `wrapped_response_length(n)` bytes on the wire.
pub trait ProtocolWrapper: Send + Sync + fmt::Debug {
    /// Wrap a logical request payload into its wire form.
    fn wrap_request(&self, raw: &[u8]) -> Result<Bytes>;

    /// Wire length of a request whose logical payload is `len` bytes.
    fn wrapped_request_length(&self, len: usize) -> usize;

    /// Unwrap a wire response into its logical payload.
    fn unwrap_response(&self, wrapped: &[u8]) -> Result<Bytes>;

    /// Wire length of a response whose logical payload is `len` bytes.
    fn wrapped_response_length(&self, len: usize) -> usize;
}

/// Wrap `payload`, or pass it through when no wrapper is configured.
pub fn wrap_request(wrapper: Option<&dyn ProtocolWrapper>, payload: &[u8]) -> Result<Bytes> {
    match wrapper {
        Some(wrapper) => wrapper.wrap_request(payload),
        None => Ok(Bytes::copy_from_slice(payload)),
    }
}

/// Unwrap `wire`, or pass it through when no wrapper is configured.
pub fn unwrap_response(wrapper: Option<&dyn ProtocolWrapper>, wire: &[u8]) -> Result<Bytes> {
    match wrapper {
        Some(wrapper) => wrapper.unwrap_response(wire),
        None => Ok(Bytes::copy_from_slice(wire)),
    }
}

/// Number of wire bytes to collect for an `len`-byte logical response.
pub fn response_wire_length(wrapper: Option<&dyn ProtocolWrapper>, len: usize) -> usize {
    wrapper.map_or(len, |wrapper| wrapper.wrapped_response_length(len))
}

/// Number of wire bytes sent for an `len`-byte logical request.
pub fn request_wire_length(wrapper: Option<&dyn ProtocolWrapper>, len: usize) -> usize {
    wrapper.map_or(len, |wrapper| wrapper.wrapped_request_length(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::PrefixWrapper;

    #[test]
    fn absent_wrapper_is_identity() {
        let wire = wrap_request(None, b"abc").unwrap();
        assert_eq!(wire.as_ref(), b"abc");
        let raw = unwrap_response(None, b"xyz").unwrap();
        assert_eq!(raw.as_ref(), b"xyz");
        assert_eq!(response_wire_length(None, 7), 7);
        assert_eq!(request_wire_length(None, 7), 7);
    }

    #[test]
    fn present_wrapper_is_applied() {
        let wrapper = PrefixWrapper::new([0x00]);
        let dyn_wrapper: Option<&dyn ProtocolWrapper> = Some(&wrapper);

        let wire = wrap_request(dyn_wrapper, b"ab").unwrap();
        assert_eq!(wire.as_ref(), &[0x00, b'a', b'b']);
        assert_eq!(request_wire_length(dyn_wrapper, 2), 3);
        assert_eq!(response_wire_length(dyn_wrapper, 9), 10);
        assert_eq!(unwrap_response(dyn_wrapper, &wire).unwrap().as_ref(), b"ab");
    }
}
