//! Frame types for the farming channel's wire format.
//!
//! Every frame is a JSON object with a `type` field. The client sends two
//! kinds of frames ([`OutboundFrame`]); the server's frames are classified
//! into [`InboundFrame`] with `type` treated as an open string enum, so
//! values this crate doesn't know decode as `Unrecognized` instead of
//! failing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `type` values used on the wire.
pub mod frame_type {
    /// Client auth frame, and the server's auth acknowledgement.
    pub const AUTH: &str = "extension_auth";
    /// Client keep-alive frame, and the server's acknowledgement.
    pub const HEARTBEAT: &str = "extension_heartbeat";
    /// Server push with the account's point totals.
    pub const USER_UPDATE: &str = "extension_user_msg";
    /// Server-reported error.
    pub const ERROR: &str = "error";
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Signed login material carried by the auth frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthData {
    /// Address of the signing identity.
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// The SIWE-style message that was signed.
    pub message: String,
    /// `0x`-prefixed hex signature over `message`.
    pub signature: String,
}

/// Frames the client sends.
///
/// ```text
/// {"type":"extension_auth","data":{"userId":..,"message":..,"signature":..}}
/// {"type":"extension_heartbeat","token":..,"address":..,"taskEnable":false}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    /// In-band authentication, sent once right after the transport opens.
    #[serde(rename = "extension_auth")]
    Auth { data: AuthData },

    /// Keep-alive, only valid once the server has granted a session token.
    #[serde(rename = "extension_heartbeat")]
    Heartbeat {
        token: String,
        address: String,
        #[serde(rename = "taskEnable")]
        task_enable: bool,
    },
}

impl OutboundFrame {
    /// Builds a heartbeat frame. Task execution is always disabled.
    pub fn heartbeat(token: impl Into<String>, address: impl Into<String>) -> Self {
        Self::Heartbeat {
            token: token.into(),
            address: address.into(),
            task_enable: false,
        }
    }

    /// The frame's `type` value.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => frame_type::AUTH,
            Self::Heartbeat { .. } => frame_type::HEARTBEAT,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Point totals pushed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct PointsUpdate {
    /// All-time points.
    #[serde(rename = "currentPoints", default)]
    pub total: f64,
    /// Points earned today.
    #[serde(rename = "currentDayPoints", default)]
    pub today: f64,
}

/// A server frame, classified by its `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawFrame")]
pub enum InboundFrame {
    /// The server accepted the auth frame and granted a session token.
    /// `token` is `None` if the acknowledgement carried no token.
    AuthAck { token: Option<String> },

    /// Point totals for the account.
    UserUpdate(PointsUpdate),

    /// Liveness confirmation for a heartbeat.
    HeartbeatAck,

    /// The server reported an error. Not terminal on its own.
    Error { message: String },

    /// A `type` this client doesn't handle (empty if the field was missing).
    Unrecognized { kind: String },
}

impl InboundFrame {
    /// The frame's `type` value as received.
    pub fn kind(&self) -> &str {
        match self {
            Self::AuthAck { .. } => frame_type::AUTH,
            Self::UserUpdate(_) => frame_type::USER_UPDATE,
            Self::HeartbeatAck => frame_type::HEARTBEAT,
            Self::Error { .. } => frame_type::ERROR,
            Self::Unrecognized { kind } => kind,
        }
    }
}

/// The loose shape every server frame shares.
#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
}

impl From<RawFrame> for InboundFrame {
    fn from(raw: RawFrame) -> Self {
        match raw.kind.as_str() {
            frame_type::AUTH => Self::AuthAck {
                token: raw
                    .data
                    .get("token")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            },
            frame_type::USER_UPDATE => {
                Self::UserUpdate(serde_json::from_value(raw.data).unwrap_or_default())
            }
            frame_type::HEARTBEAT => Self::HeartbeatAck,
            frame_type::ERROR => Self::Error {
                message: raw
                    .message
                    .unwrap_or_else(|| "Unknown error".to_string()),
            },
            _ => Self::Unrecognized { kind: raw.kind },
        }
    }
}
