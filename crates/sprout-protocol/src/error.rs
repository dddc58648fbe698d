//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a frame into text).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed: the text is not a JSON object frame.
    ///
    /// This is the "malformed frame" case. Frames that parse but carry an
    /// unknown `type` are not errors; they decode as
    /// [`InboundFrame::Unrecognized`](crate::InboundFrame::Unrecognized).
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}
