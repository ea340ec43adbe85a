//! Binary frame encoding (§4.1 of the spec).
//!
//! ```text
//! byte 0       : protocol version (=1)
//! byte 1       : frame type code
//! bytes 2..3   : session-id length L, big-endian u16
//! bytes 4..4+L : session-id bytes (UTF-8)
//! bytes 4+L..  : payload
//! ```

use crate::error::ProtocolError;
use crate::frame::{BinaryTypeCode, Frame, PROTOCOL_VERSION};

const HEADER_LEN: usize = 4;

/// Encode a frame as a binary message. Returns `None` for frame kinds that
/// have no binary representation (the JSON-only control frames) — callers
/// encode those with [`crate::encode_text`] instead.
pub fn encode_binary(frame: &Frame) -> Result<Option<Vec<u8>>, ProtocolError> {
    let (code, session_id, payload): (BinaryTypeCode, &str, Vec<u8>) = match frame {
        Frame::Stdin { session_id, payload } => {
            (BinaryTypeCode::Stdin, session_id.as_str(), payload.clone())
        }
        Frame::Stdout { session_id, payload } => {
            (BinaryTypeCode::Stdout, session_id.as_str(), payload.clone())
        }
        Frame::Resize { session_id, rows, cols } => {
            let mut payload = Vec::with_capacity(4);
            payload.extend_from_slice(&rows.to_be_bytes());
            payload.extend_from_slice(&cols.to_be_bytes());
            (BinaryTypeCode::Resize, session_id.as_str(), payload)
        }
        Frame::Ping { session_id, binary: true } => {
            (BinaryTypeCode::Ping, session_id.as_str(), Vec::new())
        }
        Frame::Pong { session_id, binary: true } => {
            (BinaryTypeCode::Pong, session_id.as_str(), Vec::new())
        }
        _ => return Ok(None),
    };

    if session_id.len() > u16::MAX as usize {
        return Err(ProtocolError::SessionIdTooLong(
            session_id.to_string(),
            session_id.len(),
        ));
    }

    let mut out = Vec::with_capacity(HEADER_LEN + session_id.len() + payload.len());
    out.push(PROTOCOL_VERSION);
    out.push(code as u8);
    out.extend_from_slice(&(session_id.len() as u16).to_be_bytes());
    out.extend_from_slice(session_id.as_bytes());
    out.extend_from_slice(&payload);
    Ok(Some(out))
}

/// Decode a binary message into a `Frame`.
///
/// Returns `None` when the frame is malformed and must be dropped silently
/// (truncated header, truncated session id, invalid UTF-8, a RESIZE payload
/// that isn't exactly 4 bytes, or an unrecognized type code) — per spec
/// §4.1 ("Invalid length or truncated frames are dropped").
///
/// A version byte other than [`PROTOCOL_VERSION`] is *not* dropped: it
/// synthesizes `Frame::Unsupported` so the caller can reply and close,
/// per invariant 3 in spec §8. This function never panics on any input.
pub fn decode_binary(bytes: &[u8]) -> Option<Frame> {
    if bytes.is_empty() {
        return None;
    }
    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Some(Frame::Unsupported { version: version as u32 });
    }
    if bytes.len() < HEADER_LEN {
        return None;
    }
    let code = BinaryTypeCode::from_u8(bytes[1])?;
    let id_len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    if bytes.len() < HEADER_LEN + id_len {
        return None;
    }
    let session_id = std::str::from_utf8(&bytes[HEADER_LEN..HEADER_LEN + id_len])
        .ok()?
        .to_string();
    let payload = &bytes[HEADER_LEN + id_len..];

    let frame = match code {
        BinaryTypeCode::Stdin => Frame::Stdin { session_id, payload: payload.to_vec() },
        BinaryTypeCode::Stdout => Frame::Stdout { session_id, payload: payload.to_vec() },
        BinaryTypeCode::Resize => {
            if payload.len() != 4 {
                return None;
            }
            let rows = u16::from_be_bytes([payload[0], payload[1]]);
            let cols = u16::from_be_bytes([payload[2], payload[3]]);
            Frame::Resize { session_id, rows, cols }
        }
        BinaryTypeCode::Ping => Frame::Ping { session_id, binary: true },
        BinaryTypeCode::Pong => Frame::Pong { session_id, binary: true },
    };
    Some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_stdin() {
        let frame = Frame::Stdin { session_id: "abc".into(), payload: vec![1, 2, 3] };
        let bytes = encode_binary(&frame).unwrap().unwrap();
        assert_eq!(decode_binary(&bytes), Some(frame));
    }

    #[test]
    fn resize_payload_is_exactly_four_bytes() {
        let frame = Frame::Resize { session_id: "s".into(), rows: 24, cols: 80 };
        let bytes = encode_binary(&frame).unwrap().unwrap();
        // version + type + 2-byte len + 1-byte id + 4-byte payload
        assert_eq!(bytes.len(), HEADER_LEN + 1 + 4);
        assert_eq!(decode_binary(&bytes), Some(frame));
    }

    #[test]
    fn truncated_frame_is_dropped() {
        let frame = Frame::Stdin { session_id: "abc".into(), payload: vec![9, 9] };
        let bytes = encode_binary(&frame).unwrap().unwrap();
        // cut into the 3-byte session id itself, not the unbounded payload
        let bytes = &bytes[..HEADER_LEN + 1];
        assert_eq!(decode_binary(bytes), None);
    }

    #[test]
    fn bad_version_is_unsupported_not_panic() {
        for first in 0u8..=255 {
            if first == PROTOCOL_VERSION {
                continue;
            }
            let bytes = vec![first, 1, 0, 0];
            assert_eq!(decode_binary(&bytes), Some(Frame::Unsupported { version: first as u32 }));
        }
    }

    #[test]
    fn empty_session_id_allowed_for_ping() {
        let frame = Frame::Ping { session_id: String::new(), binary: true };
        let bytes = encode_binary(&frame).unwrap().unwrap();
        assert_eq!(decode_binary(&bytes), Some(frame));
    }

    #[test]
    fn unknown_type_code_is_dropped() {
        let bytes = vec![PROTOCOL_VERSION, 0xEE, 0, 0];
        assert_eq!(decode_binary(&bytes), None);
    }
}
