//! Blackhole wire protocol: binary data-path frames and JSON control
//! frames, unified behind a single [`Frame`] type. See spec §4.1 and §6.

mod binary;
mod error;
mod frame;
mod json;

pub use binary::{decode_binary, encode_binary};
pub use error::ProtocolError;
pub use frame::{BinaryTypeCode, Frame, PROTOCOL_VERSION};
pub use json::{decode_text, encode_text};

/// A decoded wire message together with which encoding carried it. Hosts
/// and clients use this to answer design note 9c: echo the encoding a
/// ping/pong arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Binary,
    Text,
}

/// Decode a raw binary WebSocket message.
pub fn decode_message_binary(bytes: &[u8]) -> Option<Frame> {
    decode_binary(bytes)
}

/// Decode a raw text WebSocket message.
pub fn decode_message_text(text: &str) -> Frame {
    decode_text(text)
}

/// Encode a frame for the wire, preferring binary when the frame supports
/// it (the data path) and falling back to JSON for control frames.
pub fn encode_message(frame: &Frame) -> Result<EncodedMessage, ProtocolError> {
    if let Some(bytes) = encode_binary(frame)? {
        return Ok(EncodedMessage::Binary(bytes));
    }
    match encode_text(frame) {
        Some(text) => Ok(EncodedMessage::Text(text)),
        None => Err(ProtocolError::UnencodableOnTransport),
    }
}

/// The encoded form of an outgoing frame, ready to hand to a WebSocket sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedMessage {
    Binary(Vec<u8>),
    Text(String),
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn session_id_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9\\-]{0,64}"
    }

    proptest! {
        /// Invariant 1: binary codec round-trip for stdin/stdout/resize.
        #[test]
        fn binary_round_trip_stdin(session_id in session_id_strategy(), payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let frame = Frame::Stdin { session_id, payload };
            let bytes = encode_binary(&frame).unwrap().unwrap();
            prop_assert_eq!(decode_binary(&bytes), Some(frame));
        }

        #[test]
        fn binary_round_trip_stdout(session_id in session_id_strategy(), payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let frame = Frame::Stdout { session_id, payload };
            let bytes = encode_binary(&frame).unwrap().unwrap();
            prop_assert_eq!(decode_binary(&bytes), Some(frame));
        }

        /// Invariant 2: resize payload round-trip, exactly 4 bytes, for all (rows, cols).
        #[test]
        fn resize_round_trip(session_id in session_id_strategy(), rows in any::<u16>(), cols in any::<u16>()) {
            let frame = Frame::Resize { session_id, rows, cols };
            let bytes = encode_binary(&frame).unwrap().unwrap();
            prop_assert_eq!(decode_binary(&bytes), Some(frame));
        }

        /// Invariant 3: any byte sequence whose first byte != 1 yields Unsupported, never panics.
        #[test]
        fn version_guard_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode_binary(&bytes);
        }

        #[test]
        fn version_guard_first_byte(first in any::<u8>(), rest in proptest::collection::vec(any::<u8>(), 0..32)) {
            prop_assume!(first != PROTOCOL_VERSION);
            let mut bytes = vec![first];
            bytes.extend(rest);
            prop_assert_eq!(decode_binary(&bytes), Some(Frame::Unsupported { version: first as u32 }));
        }

        /// Invariant 4 (JSON half): arbitrary text never panics the decoder.
        #[test]
        fn json_decode_never_panics(text in ".*") {
            let _ = decode_text(&text);
        }
    }
}
