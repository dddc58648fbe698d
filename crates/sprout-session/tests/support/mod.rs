//! In-memory doubles for the session seams.
//!
//! `scripted()` returns a connection plus a `Server` handle: the test pushes
//! inbound frames through the handle and inspects what the session sent.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use sprout_session::{
    AccountApi, AccountError, Clock, FixedClock, Identity, SessionEvent, SignError,
    SignedMessage, Signer,
};
use sprout_transport::{Connection, ConnectionId, Dialer, ProxyUri, TransportError};
use tokio::sync::mpsc;
use tokio::time::Instant;

// =========================================================================
// Transport
// =========================================================================

pub enum Inbound {
    Text(String),
    Close,
    Reset,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub struct ScriptedConnection {
    id: ConnectionId,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    sent: Arc<Mutex<Vec<(Instant, String)>>>,
    closed: Arc<AtomicBool>,
}

impl Connection for ScriptedConnection {
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed(io::Error::other("closed")));
        }
        self.sent
            .lock()
            .unwrap()
            .push((Instant::now(), text.to_owned()));
        Ok(())
    }

    async fn recv_text(&self) -> Result<Option<String>, TransportError> {
        let mut rx = self.inbound.lock().await;
        match rx.recv().await {
            Some(Inbound::Text(text)) => Ok(Some(text)),
            Some(Inbound::Close) => Ok(None),
            Some(Inbound::Reset) => Err(TransportError::ReceiveFailed(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "reset by peer",
            ))),
            // Server handle dropped: behave like a silent peer.
            None => std::future::pending().await,
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// The test's side of a scripted connection.
#[derive(Clone)]
pub struct Server {
    tx: mpsc::UnboundedSender<Inbound>,
    sent: Arc<Mutex<Vec<(Instant, String)>>>,
    closed: Arc<AtomicBool>,
}

impl Server {
    pub fn push(&self, text: &str) {
        let _ = self.tx.send(Inbound::Text(text.to_owned()));
    }

    pub fn auth_ack(&self, token: &str) {
        self.push(&format!(
            r#"{{"type":"extension_auth","data":{{"token":"{token}"}}}}"#
        ));
    }

    pub fn close(&self) {
        let _ = self.tx.send(Inbound::Close);
    }

    pub fn reset(&self) {
        let _ = self.tx.send(Inbound::Reset);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn sent_of_type(&self, kind: &str) -> Vec<(Instant, serde_json::Value)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(at, text)| {
                let value: serde_json::Value = serde_json::from_str(text).ok()?;
                (value["type"] == kind).then_some((*at, value))
            })
            .collect()
    }

    pub fn heartbeats(&self) -> Vec<Instant> {
        self.sent_of_type("extension_heartbeat")
            .into_iter()
            .map(|(at, _)| at)
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn scripted() -> (ScriptedConnection, Server) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    let conn = ScriptedConnection {
        id: ConnectionId::new(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
        inbound: tokio::sync::Mutex::new(rx),
        sent: sent.clone(),
        closed: closed.clone(),
    };
    (conn, Server { tx, sent, closed })
}

/// Hands out pre-built connections in order; fails once the script runs out.
#[derive(Default)]
pub struct ScriptedDialer {
    script: Mutex<VecDeque<Result<ScriptedConnection, TransportError>>>,
    pub dials: AtomicU32,
}

impl ScriptedDialer {
    pub fn with(conn: ScriptedConnection) -> Self {
        let dialer = Self::default();
        dialer.script.lock().unwrap().push_back(Ok(conn));
        dialer
    }

    pub fn failing(err: TransportError) -> Self {
        let dialer = Self::default();
        dialer.script.lock().unwrap().push_back(Err(err));
        dialer
    }
}

impl Dialer for ScriptedDialer {
    type Connection = ScriptedConnection;

    async fn dial(&self) -> Result<ScriptedConnection, TransportError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::ConnectFailed(io::Error::other("no script"))))
    }

    fn proxy(&self) -> Option<&ProxyUri> {
        None
    }
}

/// A dialer whose connect never completes.
pub struct HangingDialer;

impl Dialer for HangingDialer {
    type Connection = ScriptedConnection;

    async fn dial(&self) -> Result<ScriptedConnection, TransportError> {
        std::future::pending().await
    }

    fn proxy(&self) -> Option<&ProxyUri> {
        None
    }
}

// =========================================================================
// Auth seams
// =========================================================================

pub struct TestSigner {
    identity: Identity,
}

impl TestSigner {
    pub fn new() -> Self {
        Self {
            identity: Identity::new("0xAbC0000000000000000000000000000000000001"),
        }
    }
}

impl Signer for TestSigner {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn sign_message(&self, message: &str) -> Result<String, SignError> {
        Ok(format!("0x{:08x}", message.len()))
    }
}

#[derive(Default)]
pub struct TestApi {
    pub nonce_calls: AtomicU32,
    pub login_calls: AtomicU32,
    pub fail_nonce: AtomicBool,
}

impl AccountApi for TestApi {
    async fn nonce(&self, _identity: &Identity) -> Result<String, AccountError> {
        let n = self.nonce_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_nonce.load(Ordering::SeqCst) {
            return Err(AccountError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(format!("nonce-{n}"))
    }

    async fn login(&self, _signed: &SignedMessage) -> Result<String, AccountError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        Ok("bearer".into())
    }
}

pub fn clock() -> impl Clock {
    FixedClock(Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap())
}

// =========================================================================
// Events
// =========================================================================

pub fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
