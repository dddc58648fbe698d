//! Farm-level events, tagged with the identity that produced them.

use std::time::Duration;

use sprout_policy::FailureClass;
use sprout_session::{EventSink, Identity, SessionEvent};
use tokio::sync::mpsc;

/// One event from one identity's orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct FarmEvent {
    pub identity: Identity,
    pub kind: FarmEventKind,
}

/// What happened. Session-level events are wrapped unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum FarmEventKind {
    /// A new cycle is starting. `attempt` is the failure count so far.
    CycleStarted { attempt: u32 },
    Session(SessionEvent),
    /// Waiting before retrying on the same proxy.
    Backoff {
        attempt: u32,
        delay: Duration,
        class: FailureClass,
    },
    /// Quick retries exhausted; waiting before corrective action.
    Cooldown { delay: Duration },
    /// Switched egress proxy. Both sides are masked.
    ProxyRotated { from: Option<String>, to: String },
    /// Farming for this identity stopped on a configuration error.
    Halted { reason: String },
    /// Farming for this identity stopped on shutdown.
    Stopped,
}

/// Sending half of the event stream. Events are dropped silently once the
/// receiver is gone.
pub type FarmEvents = mpsc::UnboundedSender<FarmEvent>;

/// Forwards one session's events into the farm event stream.
pub(crate) struct SessionForward {
    pub(crate) identity: Identity,
    pub(crate) tx: FarmEvents,
}

impl EventSink for SessionForward {
    fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(FarmEvent {
            identity: self.identity.clone(),
            kind: FarmEventKind::Session(event),
        });
    }
}
