//! The unified frame model shared by both wire encodings.
//!
//! A `Frame` is the decoded, encoding-agnostic representation of a single
//! Blackhole message. Binary frames (STDIN/STDOUT/RESIZE/PING/PONG) and
//! JSON control frames (list/create/close/...) both decode into the same
//! enum, so the rest of the crate (host controller, client coordinator)
//! never has to think about which wire encoding a message arrived on.

/// Protocol version. Bumping this is a breaking wire change; any peer that
/// sees a different version emits [`Frame::Unsupported`] and closes.
pub const PROTOCOL_VERSION: u8 = 1;

/// Binary frame type codes (byte 1 of the binary header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BinaryTypeCode {
    Stdin = 1,
    Stdout = 2,
    Resize = 3,
    Ping = 4,
    Pong = 5,
}

impl BinaryTypeCode {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Stdin),
            2 => Some(Self::Stdout),
            3 => Some(Self::Resize),
            4 => Some(Self::Ping),
            5 => Some(Self::Pong),
            _ => None,
        }
    }
}

/// A fully decoded Blackhole message, independent of wire encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// client -> host: keystrokes / raw bytes to write into the PTY.
    Stdin { session_id: String, payload: Vec<u8> },
    /// host -> client: PTY output bytes.
    Stdout { session_id: String, payload: Vec<u8> },
    /// client -> host: resize the PTY to (rows, cols).
    Resize { session_id: String, rows: u16, cols: u16 },
    /// either direction, either encoding. `binary` records which encoding
    /// this particular frame arrived (or should be sent) on, so a
    /// transport can echo the encoding it received (design note 9c).
    Ping { session_id: String, binary: bool },
    Pong { session_id: String, binary: bool },

    /// client -> host: "what sessions exist?"
    List,
    /// client -> host: "make me a new session"
    Create,
    /// client -> host: "close this session"
    Close { session_id: String },

    /// host -> client: full session id list, in registry creation order.
    SessionList { sessions: Vec<String> },
    /// host -> client: a session was created (in response to `create`, or
    /// because another peer created one).
    SessionCreated { session_id: String },
    /// host -> client: a session ended.
    SessionClosed { session_id: String },
    /// relay -> host: the relay assigned this host a session code.
    SessionAssigned { session_id: String },

    /// host -> client (or relay -> host): a recoverable error occurred.
    Error { code: String, message: String },

    /// Synthesized whenever the wire version byte/`v` field isn't
    /// [`PROTOCOL_VERSION`]. Never panics to produce; see invariant 3 in
    /// spec §8.
    Unsupported { version: u32 },

    /// A syntactically valid control frame with a `type` this crate
    /// doesn't recognize. Forward-compatible: consumers ignore it.
    Unknown,
}

impl Frame {
    /// True for frame kinds that travel as binary frames on the data path.
    pub fn is_binary_kind(&self) -> bool {
        matches!(
            self,
            Frame::Stdin { .. } | Frame::Stdout { .. } | Frame::Resize { .. }
        )
    }
}
