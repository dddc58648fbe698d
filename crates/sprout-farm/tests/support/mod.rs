//! Scripted network doubles for orchestrator and fleet tests.
//!
//! A `TestFactory` hands out dialers bound to a proxy. Every dial is logged
//! with its virtual timestamp and proxy host, then answered from a shared
//! plan queue (refuse by default).

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use sprout_farm::{ClientFactory, FarmError};
use sprout_session::{AccountApi, AccountError, Identity, SignError, SignedMessage, Signer};
use sprout_transport::{Connection, ConnectionId, Dialer, ProxyUri, TransportError};
use tokio::sync::mpsc;
use tokio::time::Instant;

// =========================================================================
// Connection
// =========================================================================

pub struct TestConnection {
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Option<String>>>,
    closed: Arc<AtomicBool>,
}

impl Connection for TestConnection {
    async fn send_text(&self, _text: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn recv_text(&self) -> Result<Option<String>, TransportError> {
        match self.inbound.lock().await.recv().await {
            Some(frame) => Ok(frame),
            None => std::future::pending().await,
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        ConnectionId::new(0)
    }
}

/// Test side of a served connection. Dropping it leaves the peer silent.
pub struct Peer {
    tx: mpsc::UnboundedSender<Option<String>>,
    pub closed: Arc<AtomicBool>,
}

impl Peer {
    pub fn push(&self, text: &str) {
        let _ = self.tx.send(Some(text.to_owned()));
    }

    pub fn close(&self) {
        let _ = self.tx.send(None);
    }
}

pub fn connection() -> (TestConnection, Peer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        TestConnection {
            inbound: tokio::sync::Mutex::new(rx),
            closed: closed.clone(),
        },
        Peer { tx, closed },
    )
}

// =========================================================================
// Dialer and factory
// =========================================================================

pub enum Plan {
    Refuse,
    RateLimited,
    Serve(TestConnection),
}

#[derive(Default)]
pub struct Network {
    plans: Mutex<VecDeque<Plan>>,
    dials: Mutex<Vec<(Instant, Option<String>)>>,
}

impl Network {
    pub fn plan(&self, plan: Plan) {
        self.plans.lock().unwrap().push_back(plan);
    }

    /// `(virtual time, proxy host)` of every dial so far.
    pub fn dials(&self) -> Vec<(Instant, Option<String>)> {
        self.dials.lock().unwrap().clone()
    }
}

pub struct TestDialer {
    proxy: Option<ProxyUri>,
    network: Arc<Network>,
}

impl Dialer for TestDialer {
    type Connection = TestConnection;

    async fn dial(&self) -> Result<TestConnection, TransportError> {
        let host = self.proxy.as_ref().map(|p| p.host().to_owned());
        self.network.dials.lock().unwrap().push((Instant::now(), host));
        let plan = self.network.plans.lock().unwrap().pop_front();
        match plan.unwrap_or(Plan::Refuse) {
            Plan::Refuse => Err(TransportError::ConnectFailed(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "refused",
            ))),
            Plan::RateLimited => Err(TransportError::HandshakeRejected { status: 429 }),
            Plan::Serve(conn) => Ok(conn),
        }
    }

    fn proxy(&self) -> Option<&ProxyUri> {
        self.proxy.as_ref()
    }
}

#[derive(Default)]
pub struct TestApi {
    pub logins: Arc<AtomicU32>,
}

impl AccountApi for TestApi {
    async fn nonce(&self, _identity: &Identity) -> Result<String, AccountError> {
        Ok("nonce".into())
    }

    async fn login(&self, _signed: &SignedMessage) -> Result<String, AccountError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok("bearer".into())
    }
}

#[derive(Default)]
pub struct TestFactory {
    pub network: Arc<Network>,
    pub logins: Arc<AtomicU32>,
    /// Proxy hosts for which `build` fails.
    pub broken_hosts: Vec<String>,
    pub builds: Mutex<Vec<Option<String>>>,
}

impl ClientFactory for TestFactory {
    type Api = TestApi;
    type Dialer = TestDialer;

    fn build(&self, proxy: Option<&ProxyUri>) -> Result<(TestApi, TestDialer), FarmError> {
        let host = proxy.map(|p| p.host().to_owned());
        self.builds.lock().unwrap().push(host.clone());
        if let Some(host) = host {
            if self.broken_hosts.contains(&host) {
                return Err(FarmError::Client(format!("cannot bind {host}")));
            }
        }
        Ok((
            TestApi {
                logins: self.logins.clone(),
            },
            TestDialer {
                proxy: proxy.cloned(),
                network: self.network.clone(),
            },
        ))
    }
}

// =========================================================================
// Identity
// =========================================================================

pub struct TestSigner(pub Identity);

impl TestSigner {
    pub fn shared(address: &str) -> Arc<dyn Signer> {
        Arc::new(Self(Identity::new(address)))
    }
}

impl Signer for TestSigner {
    fn identity(&self) -> &Identity {
        &self.0
    }

    fn sign_message(&self, _message: &str) -> Result<String, SignError> {
        Ok("0xsig".into())
    }
}

pub fn proxy(host: &str) -> ProxyUri {
    ProxyUri::parse(&format!("http://user:pass@{host}:8080")).unwrap()
}
