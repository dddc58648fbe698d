//! Inbound frame dispatch and heartbeat scheduling.
//!
//! The dispatcher is a pure state holder: it never touches the network or a
//! clock. The runner feeds it every inbound frame together with the current
//! instant, asks whether a heartbeat is due, and reports when one was sent.
//!
//! # Heartbeat rule
//!
//! Nothing is sent until an auth-ack has delivered a session token. After
//! that a heartbeat is due when either
//!
//! - `heartbeat_interval` has passed since the last heartbeat (or since the
//!   auth-ack, which resets the heartbeat clock), or
//! - `receive_timeout` has passed with no inbound frame and no heartbeat.
//!
//! ```text
//! t=0   auth-ack (token T)          last_heartbeat = 0
//! t=30  heartbeat due (interval)    last_heartbeat = 30
//! t=60  heartbeat due (interval)    ...
//! ```

use sprout_protocol::{InboundFrame, PointsUpdate};
use tokio::time::{Duration, Instant};

/// What an inbound frame meant.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// A session token was granted (or replaced).
    Authenticated,
    /// An auth-ack arrived without a token.
    AuthAckWithoutToken,
    /// Balance update pushed by the server.
    Points(PointsUpdate),
    HeartbeatAck,
    /// The server reported an error; the session keeps running.
    ServerError(String),
    /// A frame type this client doesn't handle.
    Ignored(String),
}

/// Per-session dispatch and heartbeat state.
#[derive(Debug)]
pub struct Dispatcher {
    heartbeat_interval: Duration,
    receive_timeout: Duration,
    session_token: Option<String>,
    last_heartbeat_at: Instant,
    last_inbound_at: Instant,
}

impl Dispatcher {
    /// Creates a dispatcher for a session that became active at `now`.
    pub fn new(heartbeat_interval: Duration, receive_timeout: Duration, now: Instant) -> Self {
        Self {
            heartbeat_interval,
            receive_timeout,
            session_token: None,
            last_heartbeat_at: now,
            last_inbound_at: now,
        }
    }

    /// The session token, once the server granted one.
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn last_heartbeat_at(&self) -> Instant {
        self.last_heartbeat_at
    }

    /// Classifies one inbound frame received at `now` and updates state.
    pub fn handle(&mut self, frame: InboundFrame, now: Instant) -> Dispatch {
        self.last_inbound_at = now;
        match frame {
            InboundFrame::AuthAck { token: Some(token) } => {
                self.session_token = Some(token);
                self.last_heartbeat_at = now;
                Dispatch::Authenticated
            }
            InboundFrame::AuthAck { token: None } => Dispatch::AuthAckWithoutToken,
            InboundFrame::UserUpdate(points) => Dispatch::Points(points),
            InboundFrame::HeartbeatAck => Dispatch::HeartbeatAck,
            InboundFrame::Error { message } => Dispatch::ServerError(message),
            InboundFrame::Unrecognized { kind } => Dispatch::Ignored(kind),
        }
    }

    /// Whether a heartbeat should be sent at `now`.
    pub fn heartbeat_due(&self, now: Instant) -> bool {
        self.session_token.is_some() && now >= self.heartbeat_deadline()
    }

    /// Records that a heartbeat went out at `now`.
    pub fn heartbeat_sent(&mut self, now: Instant) {
        self.last_heartbeat_at = now;
    }

    /// When the next heartbeat becomes due, or `None` while no session
    /// token is held.
    pub fn next_heartbeat_at(&self) -> Option<Instant> {
        self.session_token.as_ref().map(|_| self.heartbeat_deadline())
    }

    fn heartbeat_deadline(&self) -> Instant {
        let by_interval = self.last_heartbeat_at + self.heartbeat_interval;
        let quiet_since = self.last_inbound_at.max(self.last_heartbeat_at);
        let by_silence = quiet_since + self.receive_timeout;
        by_interval.min(by_silence)
    }
}
