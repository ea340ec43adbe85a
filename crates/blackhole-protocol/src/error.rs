use thiserror::Error;

/// Errors raised while *encoding* a frame. Decoding never errors — a
/// malformed or unsupported wire message always turns into a `Frame`
/// value (`Unknown`/`Unsupported`) or is dropped; see [`crate::decode_binary`]
/// and [`crate::decode_text`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("session id {0:?} is {1} bytes, exceeds the 65535-byte wire limit")]
    SessionIdTooLong(String, usize),
    #[error("frame type cannot be encoded on this transport encoding")]
    UnencodableOnTransport,
}
