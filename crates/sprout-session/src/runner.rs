//! The session runner: one connection driven through its lifecycle.
//!
//! ```text
//! connect()       Disconnected → Connecting → Authenticating
//! authenticate()  Authenticating → Active           (auth frame sent)
//! run()           Active → Ended(ok)                (shutdown)
//!                 Active → Ended(error)             (transport error, close,
//!                                                   malformed frame, no auth-ack)
//! ```
//!
//! `run` is a single loop: receive with a timeout that expires exactly when
//! the next heartbeat (or the auth-ack deadline) is due, raced against
//! shutdown. A receive timeout only means "check the heartbeat", never
//! failure. Nothing in here sleeps or retries.
//!
//! # Events
//!
//! With a sink attached via [`Session::with_events`], every state change,
//! points update and server error is reported as a [`SessionEvent`] as it
//! happens. The sink never blocks the loop.

use std::sync::Arc;

use sprout_policy::CancellationToken;
use sprout_protocol::{Codec, InboundFrame, JsonCodec, OutboundFrame};
use sprout_transport::{Connection, Dialer};
use tokio::time::{Duration, Instant};

use crate::connector::{self, AuthSource, Connector};
use crate::dispatcher::{Dispatch, Dispatcher};
use crate::event::SharedSink;
use crate::{
    AccountApi, Identity, SessionConfig, SessionError, SessionEvent, SessionState, TokenStore,
};

/// Upper bound on the graceful close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How a session ended.
#[derive(Debug)]
pub struct SessionOutcome {
    error: Option<SessionError>,
}

impl SessionOutcome {
    /// `true` only when the session was stopped by shutdown.
    pub fn ended_cleanly(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    pub fn into_result(self) -> Result<(), SessionError> {
        match self.error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

/// One live (or formerly live) connection for one identity.
pub struct Session<C> {
    identity: Identity,
    config: Arc<SessionConfig>,
    state: SessionState,
    connection: Option<C>,
    auth_source: Option<AuthSource>,
    events: Option<SharedSink>,
}

impl<C: Connection> Session<C> {
    pub fn new(identity: Identity, config: Arc<SessionConfig>) -> Self {
        Self {
            identity,
            config,
            state: SessionState::Disconnected,
            connection: None,
            auth_source: None,
            events: None,
        }
    }

    /// Routes this session's events to `sink`.
    pub fn with_events(mut self, sink: SharedSink) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Which payload the auth frame used, once one was sent.
    pub fn auth_source(&self) -> Option<AuthSource> {
        self.auth_source
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Opens the transport. Exactly one attempt.
    pub async fn connect<D>(
        &mut self,
        dialer: &D,
        shutdown: &CancellationToken,
    ) -> Result<(), SessionError>
    where
        D: Dialer<Connection = C>,
    {
        self.transition(SessionState::Connecting, "connect")?;
        if let Some(proxy) = dialer.proxy() {
            tracing::debug!(identity = %self.identity, proxy = %proxy.masked(), "connecting via proxy");
        }

        match connector::open(dialer, shutdown).await {
            Ok(conn) => {
                tracing::debug!(identity = %self.identity, conn = %conn.id(), "transport open");
                self.connection = Some(conn);
                self.transition(SessionState::Authenticating, "connect")
            }
            Err(err) => Err(self.end_with(err)),
        }
    }

    /// Sends the signed auth frame. Exactly one attempt.
    ///
    /// Success means the frame was transmitted. The server confirms it later
    /// with an auth-ack, which [`run`](Self::run) waits for.
    pub async fn authenticate<A, T>(
        &mut self,
        connector: &Connector<'_, A, T>,
        shutdown: &CancellationToken,
    ) -> Result<AuthSource, SessionError>
    where
        A: AccountApi,
        T: TokenStore,
    {
        let conn = match (&self.connection, self.state) {
            (Some(conn), SessionState::Authenticating) => conn,
            (_, state) => {
                return Err(SessionError::InvalidState {
                    op: "authenticate",
                    state,
                });
            }
        };

        let attempt = async {
            let (data, source) = connector.payload().await?;
            let text = JsonCodec.encode(&OutboundFrame::Auth { data })?;
            conn.send_text(&text).await?;
            Ok::<_, SessionError>(source)
        };
        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(SessionError::Shutdown),
            result = attempt => result,
        };

        match result {
            Ok(source) => {
                self.auth_source = Some(source);
                self.transition(SessionState::Active, "authenticate")?;
                tracing::info!(identity = %self.identity, ?source, "auth frame sent, session active");
                Ok(source)
            }
            Err(err) => Err(self.end_with(err)),
        }
    }

    /// Runs the active session until shutdown or failure, then closes the
    /// transport.
    pub async fn run(&mut self, shutdown: &CancellationToken) -> SessionOutcome {
        let conn = match (self.connection.take(), self.state) {
            (Some(conn), SessionState::Active) => conn,
            (conn, state) => {
                self.connection = conn;
                return SessionOutcome {
                    error: Some(SessionError::InvalidState { op: "run", state }),
                };
            }
        };

        let result = pump(
            &conn,
            &self.identity,
            &self.config,
            self.events.as_ref(),
            shutdown,
        )
        .await;
        close(&conn, &self.identity).await;

        match result {
            Ok(()) => {
                tracing::info!(identity = %self.identity, "session stopped");
                self.set_state(SessionState::Ended { clean: true });
                SessionOutcome { error: None }
            }
            Err(err) => {
                tracing::warn!(identity = %self.identity, error = %err, "session ended");
                SessionOutcome {
                    error: Some(self.end_with(err)),
                }
            }
        }
    }

    /// Closes the transport if it is still open.
    ///
    /// A session that had not ended yet ends cleanly; an ended session keeps
    /// its outcome.
    pub async fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            close(&conn, &self.identity).await;
        }
        if !self.state.is_terminal() {
            self.set_state(SessionState::Ended { clean: true });
        }
    }

    // -----------------------------------------------------------------------
    // State helpers
    // -----------------------------------------------------------------------

    fn transition(&mut self, to: SessionState, op: &'static str) -> Result<(), SessionError> {
        if !self.state.can_transition_to(to) {
            return Err(SessionError::InvalidState {
                op,
                state: self.state,
            });
        }
        self.set_state(to);
        Ok(())
    }

    fn set_state(&mut self, to: SessionState) {
        let from = self.state;
        self.state = to;
        tracing::debug!(identity = %self.identity, %from, %to, "session state");
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn end_with(&mut self, err: SessionError) -> SessionError {
        if !self.state.is_terminal() {
            self.set_state(SessionState::Ended { clean: false });
        }
        err
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(sink) = &self.events {
            sink.emit(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Active loop
// ---------------------------------------------------------------------------

/// Drives an active connection. `Ok(())` means shutdown was observed.
async fn pump<C: Connection>(
    conn: &C,
    identity: &Identity,
    config: &SessionConfig,
    events: Option<&SharedSink>,
    shutdown: &CancellationToken,
) -> Result<(), SessionError> {
    let emit = |event: SessionEvent| {
        if let Some(sink) = events {
            sink.emit(event);
        }
    };

    let started = Instant::now();
    let auth_deadline = started + config.auth_ack_timeout;
    let mut dispatcher = Dispatcher::new(config.heartbeat_interval, config.receive_timeout, started);

    loop {
        if shutdown.is_cancelled() {
            return Ok(());
        }
        let now = Instant::now();

        let heartbeat = match dispatcher.session_token() {
            Some(token) if dispatcher.heartbeat_due(now) => {
                Some(JsonCodec.encode(&OutboundFrame::heartbeat(token, identity.address()))?)
            }
            _ => None,
        };
        if let Some(text) = heartbeat {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                sent = conn.send_text(&text) => sent?,
            }
            dispatcher.heartbeat_sent(now);
            tracing::trace!(%identity, "heartbeat sent");
            emit(SessionEvent::HeartbeatSent);
        }

        let deadline = match dispatcher.next_heartbeat_at() {
            Some(at) => at,
            None if now >= auth_deadline => {
                return Err(SessionError::AuthRejected(config.auth_ack_timeout));
            }
            None => auth_deadline,
        };

        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(()),
            received = tokio::time::timeout_at(deadline, conn.recv_text()) => received,
        };
        let text = match received {
            Err(_elapsed) => continue,
            Ok(Ok(Some(text))) => text,
            Ok(Ok(None)) => return Err(SessionError::ClosedByPeer),
            Ok(Err(err)) => return Err(err.into()),
        };

        let frame: InboundFrame = JsonCodec.decode(&text)?;
        tracing::trace!(%identity, kind = frame.kind(), "frame received");
        match dispatcher.handle(frame, Instant::now()) {
            Dispatch::Authenticated => {
                tracing::info!(%identity, "session token received");
                emit(SessionEvent::Authenticated);
            }
            Dispatch::AuthAckWithoutToken => {
                tracing::warn!(%identity, "auth acknowledgement carried no token");
            }
            Dispatch::Points(points) => {
                tracing::info!(%identity, total = points.total, today = points.today, "points updated");
                emit(SessionEvent::Points(points));
            }
            Dispatch::HeartbeatAck => {}
            Dispatch::ServerError(message) => {
                tracing::warn!(%identity, %message, "server reported an error");
                emit(SessionEvent::ServerError { message });
            }
            Dispatch::Ignored(kind) => {
                tracing::debug!(%identity, %kind, "ignoring unrecognized frame");
            }
        }
    }
}

async fn close<C: Connection>(conn: &C, identity: &Identity) {
    match tokio::time::timeout(CLOSE_TIMEOUT, conn.close()).await {
        Ok(Ok(())) => tracing::debug!(%identity, conn = %conn.id(), "transport closed"),
        Ok(Err(err)) => tracing::debug!(%identity, error = %err, "close failed"),
        Err(_) => tracing::debug!(%identity, "close timed out"),
    }
}
