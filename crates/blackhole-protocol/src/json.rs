//! JSON control frame encoding (§4.1, §6).
//!
//! Every JSON frame is an object with a mandatory `"v"` field (injected on
//! encode if the caller didn't set it, which they never do — callers work
//! in terms of [`Frame`], not raw JSON) and a `"type"` discriminator. This
//! mirrors `pty-proxy`'s `ControlMessage` enum (`#[serde(tag = "type",
//! rename_all = "snake_case")]`), generalized to the full control surface.

use crate::frame::{Frame, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlBody {
    List,
    Create,
    Close {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    SessionList {
        sessions: Vec<String>,
    },
    SessionCreated {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    SessionClosed {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    SessionAssigned {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Error {
        code: String,
        message: String,
    },
    Ping,
    Pong,
    Unsupported {
        version: u32,
    },
}

fn control_body_of(frame: &Frame) -> Option<ControlBody> {
    Some(match frame {
        Frame::List => ControlBody::List,
        Frame::Create => ControlBody::Create,
        Frame::Close { session_id } => ControlBody::Close { session_id: session_id.clone() },
        Frame::SessionList { sessions } => ControlBody::SessionList { sessions: sessions.clone() },
        Frame::SessionCreated { session_id } => {
            ControlBody::SessionCreated { session_id: session_id.clone() }
        }
        Frame::SessionClosed { session_id } => {
            ControlBody::SessionClosed { session_id: session_id.clone() }
        }
        Frame::SessionAssigned { session_id } => {
            ControlBody::SessionAssigned { session_id: session_id.clone() }
        }
        Frame::Error { code, message } => {
            ControlBody::Error { code: code.clone(), message: message.clone() }
        }
        Frame::Ping { binary: false, .. } => ControlBody::Ping,
        Frame::Pong { binary: false, .. } => ControlBody::Pong,
        Frame::Unsupported { version } => ControlBody::Unsupported { version: *version },
        _ => return None,
    })
}

/// Encode a frame as a JSON control message. Returns `None` for frame kinds
/// that have no JSON representation (binary-only STDIN/STDOUT/RESIZE, or a
/// binary-flavored ping/pong — callers use [`crate::encode_binary`] for
/// those).
pub fn encode_text(frame: &Frame) -> Option<String> {
    let body = control_body_of(frame)?;
    let mut value = serde_json::to_value(&body).ok()?;
    if let Value::Object(ref mut map) = value {
        map.insert("v".to_string(), serde_json::json!(PROTOCOL_VERSION));
    }
    Some(value.to_string())
}

/// Decode a JSON control message into a `Frame`.
///
/// - Absent `"v"` is treated as version 1 (injected).
/// - `"v"` present and not equal to [`PROTOCOL_VERSION`] synthesizes
///   `Frame::Unsupported`, never an error.
/// - Unparseable JSON, or a recognized version but an unrecognized
///   `"type"`, decodes to `Frame::Unknown` — forward-compatible and
///   ignored by consumers. This function never panics.
pub fn decode_text(text: &str) -> Frame {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return Frame::Unknown,
    };

    match value.get("v").and_then(Value::as_u64) {
        None => {}
        Some(v) if v == PROTOCOL_VERSION as u64 => {}
        Some(v) => return Frame::Unsupported { version: v as u32 },
    }

    let body: ControlBody = match serde_json::from_value(value) {
        Ok(b) => b,
        Err(_) => return Frame::Unknown,
    };

    match body {
        ControlBody::List => Frame::List,
        ControlBody::Create => Frame::Create,
        ControlBody::Close { session_id } => Frame::Close { session_id },
        ControlBody::SessionList { sessions } => Frame::SessionList { sessions },
        ControlBody::SessionCreated { session_id } => Frame::SessionCreated { session_id },
        ControlBody::SessionClosed { session_id } => Frame::SessionClosed { session_id },
        ControlBody::SessionAssigned { session_id } => Frame::SessionAssigned { session_id },
        ControlBody::Error { code, message } => Frame::Error { code, message },
        ControlBody::Ping => Frame::Ping { session_id: String::new(), binary: false },
        ControlBody::Pong => Frame::Pong { session_id: String::new(), binary: false },
        ControlBody::Unsupported { version } => Frame::Unsupported { version },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injects_v_when_absent() {
        let json = encode_text(&Frame::List).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["v"], 1);
        assert_eq!(value["type"], "list");
    }

    #[test]
    fn round_trips_session_closed() {
        let frame = Frame::SessionClosed { session_id: "xyz".into() };
        let json = encode_text(&frame).unwrap();
        assert_eq!(decode_text(&json), frame);
    }

    #[test]
    fn missing_v_defaults_to_supported() {
        let frame = decode_text(r#"{"type":"list"}"#);
        assert_eq!(frame, Frame::List);
    }

    #[test]
    fn wrong_v_is_unsupported() {
        let frame = decode_text(r#"{"v":2,"type":"list"}"#);
        assert_eq!(frame, Frame::Unsupported { version: 2 });
    }

    #[test]
    fn unknown_type_is_unknown_not_error() {
        let frame = decode_text(r#"{"v":1,"type":"frobnicate"}"#);
        assert_eq!(frame, Frame::Unknown);
    }

    #[test]
    fn garbage_is_unknown_not_panic() {
        assert_eq!(decode_text("not json at all {{{"), Frame::Unknown);
    }

    #[test]
    fn session_list_field_name_matches_wire_contract() {
        let json = encode_text(&Frame::SessionCreated { session_id: "id1".into() }).unwrap();
        assert!(json.contains("\"sessionId\":\"id1\""));
    }
}
