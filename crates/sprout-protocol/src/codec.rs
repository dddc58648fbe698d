//! Codec trait and the JSON implementation used on the farming channel.
//!
//! The channel carries UTF-8 text frames, so the codec maps between Rust
//! values and `String`s rather than raw bytes.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to text frames and decode them back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into one text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes one text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the text is malformed or doesn't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that produces compact JSON (no whitespace between tokens).
///
/// ## Example
///
/// ```rust
/// use sprout_protocol::{Codec, JsonCodec, OutboundFrame};
///
/// let frame = OutboundFrame::heartbeat("tok", "0xabc");
/// let text = JsonCodec.encode(&frame).unwrap();
/// assert_eq!(
///     text,
///     r#"{"type":"extension_heartbeat","token":"tok","address":"0xabc","taskEnable":false}"#
/// );
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}
