use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use duplexio_wrap::{unwrap_response, ProtocolWrapper};

use crate::error::{IoError, Result};
use crate::result::RequestResult;

/// Synchronous request/response access to one device.
///
/// Every method is serialized against every other method on the same engine.
/// The composite `write_and_read*` operations run as one atomic unit: pending
/// input is discarded, the request is written, and the response is read before
/// any other caller can touch the stream.
///
/// `wrapper` is applied exactly once on the way out and once on the way in;
/// `None` sends and returns bytes unmodified.
pub trait IoEngine: Send + Sync {
    /// Open the underlying stream. No-op when already connected.
    fn connect(&self) -> Result<()>;

    /// Close the underlying stream. No-op when already disconnected.
    fn disconnect(&self) -> Result<()>;

    /// Wrap and write `payload`, then flush. Pending input is left untouched.
    fn write(
        &self,
        payload: &[u8],
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<RequestResult>;

    /// Drain whatever input is available right now, possibly nothing.
    fn read(&self, wrapper: Option<&dyn ProtocolWrapper>) -> Result<RequestResult>;

    /// Fill `out` completely or fail within `timeout`.
    ///
    /// Fails with [`IoError::IncompleteRead`] when the stream ends early and
    /// with [`IoError::Timeout`] when the deadline passes. Never returns a
    /// partially filled buffer.
    fn read_exact(
        &self,
        out: &mut [u8],
        timeout: Duration,
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<RequestResult>;

    /// Discard pending input, write `payload`, wait `delay`, then drain.
    fn write_and_read(
        &self,
        payload: &[u8],
        delay: Duration,
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<RequestResult>;

    /// Discard pending input, write `payload`, then fill `out` within `timeout`.
    fn write_and_read_exact(
        &self,
        payload: &[u8],
        out: &mut [u8],
        timeout: Duration,
        wrapper: Option<&dyn ProtocolWrapper>,
    ) -> Result<RequestResult>;

    /// Flush pending output, then read and discard all available input.
    fn flush_all(&self) -> Result<()>;
}

macro_rules! forward_engine {
    ($ty:ty) => {
        impl<E: IoEngine + ?Sized> IoEngine for $ty {
            fn connect(&self) -> Result<()> {
                (**self).connect()
            }

            fn disconnect(&self) -> Result<()> {
                (**self).disconnect()
            }

            fn write(
                &self,
                payload: &[u8],
                wrapper: Option<&dyn ProtocolWrapper>,
            ) -> Result<RequestResult> {
                (**self).write(payload, wrapper)
            }

            fn read(&self, wrapper: Option<&dyn ProtocolWrapper>) -> Result<RequestResult> {
                (**self).read(wrapper)
            }

            fn read_exact(
                &self,
                out: &mut [u8],
                timeout: Duration,
                wrapper: Option<&dyn ProtocolWrapper>,
            ) -> Result<RequestResult> {
                (**self).read_exact(out, timeout, wrapper)
            }

            fn write_and_read(
                &self,
                payload: &[u8],
                delay: Duration,
                wrapper: Option<&dyn ProtocolWrapper>,
            ) -> Result<RequestResult> {
                (**self).write_and_read(payload, delay, wrapper)
            }

            fn write_and_read_exact(
                &self,
                payload: &[u8],
                out: &mut [u8],
                timeout: Duration,
                wrapper: Option<&dyn ProtocolWrapper>,
            ) -> Result<RequestResult> {
                (**self).write_and_read_exact(payload, out, timeout, wrapper)
            }

            fn flush_all(&self) -> Result<()> {
                (**self).flush_all()
            }
        }
    };
}

forward_engine!(Box<E>);
forward_engine!(Arc<E>);
forward_engine!(&E);

/// Unwrap an exact-length response and copy it into `out`.
///
/// The unwrapped payload must be exactly `out.len()` bytes.
pub(crate) fn unwrap_exact(
    wrapper: Option<&dyn ProtocolWrapper>,
    wire: &[u8],
    out: &mut [u8],
) -> Result<Bytes> {
    let payload = unwrap_response(wrapper, wire)?;
    if payload.len() != out.len() {
        return Err(IoError::LengthMismatch {
            actual: payload.len(),
            expected: out.len(),
        });
    }
    out.copy_from_slice(&payload);
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use duplexio_wrap::PrefixWrapper;

    use super::*;

    #[test]
    fn unwrap_exact_copies_payload() {
        let wrapper = PrefixWrapper::new([0x7e]);
        let mut out = [0u8; 2];
        let payload = unwrap_exact(Some(&wrapper), &[0x7e, 1, 2], &mut out).unwrap();
        assert_eq!(payload.as_ref(), &[1, 2]);
        assert_eq!(out, [1, 2]);
    }

    #[test]
    fn unwrap_exact_rejects_length_mismatch() {
        let mut out = [0u8; 3];
        let err = unwrap_exact(None, &[1, 2], &mut out).unwrap_err();
        assert!(matches!(
            err,
            IoError::LengthMismatch {
                actual: 2,
                expected: 3
            }
        ));
        assert_eq!(out, [0, 0, 0]);
    }
}
