//! Session configuration and the lifecycle state machine.

use std::fmt;
use std::time::Duration;

/// Default extension id used for the `Origin` header and the signed message.
pub const DEFAULT_EXTENSION_ID: &str = "bcakokeeafaehcajfkajcpbdkfnoahlh";

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timing and identity settings shared by every session of one fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum time between two heartbeats once a session token is held.
    pub heartbeat_interval: Duration,

    /// Maximum quiet period (no inbound frame, no heartbeat) before a
    /// heartbeat is forced. Hitting it is never a failure by itself.
    pub receive_timeout: Duration,

    /// How long to wait for the server to acknowledge the auth frame with a
    /// session token before giving up on the session.
    pub auth_ack_timeout: Duration,

    /// Domain placed in the signed message.
    pub extension_id: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            receive_timeout: Duration::from_secs(45),
            auth_ack_timeout: Duration::from_secs(60),
            extension_id: DEFAULT_EXTENSION_ID.to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle of one session.
///
/// ```text
///   Disconnected ──→ Connecting ──→ Authenticating ──→ Active ──→ Ended(ok)
///                        │                │               │
///                        └────────────────┴───────────────┴────→ Ended(error)
/// ```
///
/// `Ended` is terminal. Reconnecting means building a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Active,
    /// `clean` is true only when the session was stopped by shutdown.
    Ended { clean: bool },
}

impl SessionState {
    /// Returns `true` once the session has ended.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended { .. })
    }

    /// The state reached when the current step succeeds.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Disconnected => Some(Self::Connecting),
            Self::Connecting => Some(Self::Authenticating),
            Self::Authenticating => Some(Self::Active),
            Self::Active => Some(Self::Ended { clean: true }),
            Self::Ended { .. } => None,
        }
    }

    /// Returns `true` if transitioning to `target` is valid.
    ///
    /// Any non-terminal state may end; otherwise only forward steps along
    /// [`next`](Self::next) are allowed.
    pub fn can_transition_to(self, target: Self) -> bool {
        match (self, target) {
            (Self::Ended { .. }, _) => false,
            (_, Self::Ended { .. }) => true,
            _ => self.next() == Some(target),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Authenticating => write!(f, "Authenticating"),
            Self::Active => write!(f, "Active"),
            Self::Ended { clean: true } => write!(f, "Ended(ok)"),
            Self::Ended { clean: false } => write!(f, "Ended(error)"),
        }
    }
}
