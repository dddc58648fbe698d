//! Observable session events.

use std::sync::Arc;

use sprout_protocol::PointsUpdate;
use tokio::sync::mpsc;

use crate::SessionState;

/// Something observable happened in a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged { from: SessionState, to: SessionState },
    /// The server acknowledged the auth frame with a session token.
    Authenticated,
    /// The server pushed the account's point totals.
    Points(PointsUpdate),
    /// The server reported an error frame.
    ServerError { message: String },
    HeartbeatSent,
}

/// Receives session events. Emitting never blocks and never fails.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: SessionEvent);
}

impl EventSink for mpsc::UnboundedSender<SessionEvent> {
    fn emit(&self, event: SessionEvent) {
        // A dropped receiver just means nobody is listening.
        let _ = self.send(event);
    }
}

/// Shared handle to an event sink.
pub type SharedSink = Arc<dyn EventSink>;
