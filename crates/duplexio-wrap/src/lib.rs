//! Pluggable protocol wrappers for device payloads.
//!
//! A [`ProtocolWrapper`] frames every outgoing request and unframes every
//! incoming response. The engine applies it exactly twice per exchange: once
//! before transmission and once after the full wire length has arrived.
//! Passing no wrapper means payloads travel unmodified.
//!
//! Two reference wrappers ship with the crate:
//! - [`EnvelopeWrapper`]: magic + length + payload + XOR checksum
//! - [`PrefixWrapper`]: fixed prefix on requests and responses

pub mod envelope;
pub mod error;
pub mod prefix;
pub mod wrapper;

pub use envelope::EnvelopeWrapper;
pub use error::{Result, WrapError};
pub use prefix::PrefixWrapper;
pub use wrapper::{
    request_wire_length, response_wire_length, unwrap_response, wrap_request, ProtocolWrapper,
};
