/// Errors raised by protocol wrappers while wrapping or unwrapping payloads.
#[derive(Debug, thiserror::Error)]
pub enum WrapError {
    /// The wrapped message does not start with the expected magic bytes.
    #[error("invalid envelope magic (expected {expected:02X?}, got {actual:02X?})")]
    InvalidMagic { expected: [u8; 2], actual: [u8; 2] },

    /// The wrapped message is shorter than the protocol overhead.
    #[error("wrapped message truncated ({len} bytes, need at least {min})")]
    Truncated { len: usize, min: usize },

    /// The declared payload length disagrees with the bytes present.
    #[error("declared payload length {declared} does not match actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// The trailing checksum does not match the payload.
    #[error("checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// The payload cannot be represented by the protocol.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The response does not carry the expected prefix.
    #[error("response prefix mismatch (expected {expected:02X?}, got {actual:02X?})")]
    PrefixMismatch { expected: Vec<u8>, actual: Vec<u8> },
}

pub type Result<T> = std::result::Result<T, WrapError>;
