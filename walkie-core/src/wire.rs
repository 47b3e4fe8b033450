//! Framing: one JSON text frame per message, discriminant read before the payload.

use serde_json::Value;

use crate::protocol::{MessageKind, PeerMessage};

/// Largest frame accepted in either direction. Files are not chunked, so the
/// transport's own message limit (64 KiB on the Linux peer's SCTP stack) is
/// usually hit first; hosts check that before sending.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024; // 16 MiB

/// Encode a message into a single text frame.
pub fn encode(msg: &PeerMessage) -> Result<String, ProtocolError> {
    let frame = serde_json::to_string(msg).map_err(ProtocolError::Encode)?;
    if frame.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::TooLarge(frame.len()));
    }
    Ok(frame)
}

/// Decode one frame. The `type` field is resolved first so an unknown kind is
/// distinguishable from a broken frame.
pub fn decode(frame: &str) -> Result<PeerMessage, ProtocolError> {
    if frame.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::TooLarge(frame.len()));
    }
    let value: Value = serde_json::from_str(frame).map_err(ProtocolError::Malformed)?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingKind)?;
    let kind = MessageKind::from_tag(tag)
        .ok_or_else(|| ProtocolError::UnsupportedKind(tag.to_owned()))?;
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidShape { kind, source })
}

/// Error encoding or decoding a frame. Always scoped to that one frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("frame has no string `type` field")]
    MissingKind,
    #[error("unsupported message kind `{0}`")]
    UnsupportedKind(String),
    #[error("invalid `{kind}` frame: {source}")]
    InvalidShape {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("frame too large ({0} bytes)")]
    TooLarge(usize),
}

impl ProtocolError {
    /// Unknown kinds are a forward-compatibility no-op, not a fault.
    pub fn is_unsupported_kind(&self) -> bool {
        matches!(self, ProtocolError::UnsupportedKind(_))
    }
}
