//! The farming orchestrator: keeps one identity farming forever.
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ 1. bearer token (store, else login)                          │
//!   │ 2. connect once ──fail──┐                                    │
//!   │ 3. authenticate once ───┤ (disconnect)                       │
//!   │ 4. run until end ───────┤                                    │
//!   │                         ▼                                    │
//!   │ 5. ok    → attempts = 0                                      │
//!   │    error → attempts += 1                                     │
//!   │            attempts < max → backoff, same proxy              │
//!   │            otherwise      → cooldown, rotate proxy,          │
//!   │                             attempts = 0                     │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lower layers never wait or rotate; every such decision is made here, and
//! every wait is raced against the shutdown token.
//!
//! # Proxy binding
//!
//! The account API client and the dialer are built together for the current
//! proxy by a [`ClientFactory`], and rebuilt only after a rotation. Within
//! one proxy's retries every cycle reuses the same pair.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use sprout_policy::{CancellationToken, FailureClass, ProxyRotation, saturating_millis, wait};
use sprout_session::{
    AccountApi, AuthSource, Clock, Connector, Identity, Session, SessionError, Signer, TokenStore,
    login,
};
use sprout_transport::{Dialer, ProxyUri};
use tracing::Instrument;

use crate::event::{FarmEvent, FarmEventKind, FarmEvents, SessionForward};
use crate::{FarmError, OrchestratorConfig};

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Builds the network clients an orchestrator uses, bound to one proxy.
///
/// Called once at start and again after every proxy rotation.
pub trait ClientFactory: Send + Sync + 'static {
    type Api: AccountApi;
    type Dialer: Dialer;

    fn build(&self, proxy: Option<&ProxyUri>) -> Result<(Self::Api, Self::Dialer), FarmError>;
}

// ---------------------------------------------------------------------------
// Outcomes and counters
// ---------------------------------------------------------------------------

/// Result of one pass through steps 1-4.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The session ended cleanly.
    Success,
    /// Something failed; wait and try again.
    Retryable(FailureClass),
    /// Farming for this identity cannot continue.
    Fatal(FarmError),
    /// Shutdown was observed mid-cycle.
    Shutdown,
}

/// Consecutive failures since the last success or proxy rotation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AttemptCounter(u32);

impl AttemptCounter {
    /// Current count.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Records one failure and returns the new count.
    pub fn increment(&mut self) -> u32 {
        self.0 = self.0.saturating_add(1);
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

/// What an orchestrator did before it stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FarmSummary {
    /// Cycles started.
    pub cycles: u64,
    /// Cycles that ended in a retryable failure.
    pub failures: u64,
    /// Proxy switches after exhausted retries.
    pub rotations: u64,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Supervises one identity: runs sessions, backs off, rotates proxies.
pub struct Orchestrator<F: ClientFactory, T> {
    signer: Arc<dyn Signer>,
    factory: Arc<F>,
    store: Arc<T>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    rotation: ProxyRotation<ProxyUri>,
    proxy: Option<ProxyUri>,
    attempts: AttemptCounter,
    summary: FarmSummary,
    events: Option<FarmEvents>,
}

impl<F: ClientFactory, T: TokenStore> Orchestrator<F, T> {
    /// Creates an orchestrator with no proxy bound yet; see
    /// [`Orchestrator::with_proxy`].
    pub fn new(
        signer: Arc<dyn Signer>,
        factory: Arc<F>,
        store: Arc<T>,
        clock: Arc<dyn Clock>,
        config: OrchestratorConfig,
        pool: Arc<[ProxyUri]>,
    ) -> Self {
        Self {
            signer,
            factory,
            store,
            clock,
            config,
            rotation: ProxyRotation::with_rng(pool, StdRng::from_os_rng()),
            proxy: None,
            attempts: AttemptCounter::default(),
            summary: FarmSummary::default(),
            events: None,
        }
    }

    /// Starts on `proxy` instead of a direct connection.
    pub fn with_proxy(mut self, proxy: Option<ProxyUri>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Replaces the random source used for proxy selection.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        let pool: Arc<[ProxyUri]> = self.rotation.pool().into();
        self.rotation = ProxyRotation::with_rng(pool, rng);
        self
    }

    pub fn with_events(mut self, events: FarmEvents) -> Self {
        self.events = Some(events);
        self
    }

    pub fn identity(&self) -> &Identity {
        self.signer.identity()
    }

    pub fn proxy(&self) -> Option<&ProxyUri> {
        self.proxy.as_ref()
    }

    pub fn attempts(&self) -> AttemptCounter {
        self.attempts
    }

    /// Farms until shutdown or a configuration error.
    pub async fn run(mut self, shutdown: &CancellationToken) -> Result<FarmSummary, FarmError> {
        let span = tracing::info_span!("farm", identity = %self.identity());
        let result = self.run_inner(shutdown).instrument(span.clone()).await;
        span.in_scope(|| match &result {
            Ok(summary) => {
                tracing::info!(
                    cycles = summary.cycles,
                    failures = summary.failures,
                    rotations = summary.rotations,
                    "farming stopped"
                );
                self.emit(FarmEventKind::Stopped);
            }
            Err(err) => {
                tracing::error!(error = %err, "farming halted");
                self.emit(FarmEventKind::Halted {
                    reason: err.to_string(),
                });
            }
        });
        result
    }

    async fn run_inner(&mut self, shutdown: &CancellationToken) -> Result<FarmSummary, FarmError> {
        if self.config.proxy_rotation && self.proxy.is_some() && self.rotation.pool().is_empty() {
            return Err(FarmError::Policy(sprout_policy::PolicyError::EmptyPool));
        }
        let (mut api, mut dialer) = self.factory.build(self.proxy.as_ref())?;
        tracing::info!(proxy = %self.masked_proxy(), "farming started");

        loop {
            if shutdown.is_cancelled() {
                return Ok(self.summary);
            }
            self.summary.cycles += 1;
            self.emit(FarmEventKind::CycleStarted {
                attempt: self.attempts.get(),
            });

            match self.cycle(&api, &dialer, shutdown).await {
                CycleOutcome::Shutdown => return Ok(self.summary),
                CycleOutcome::Fatal(err) => return Err(err),
                CycleOutcome::Success => {
                    self.attempts.reset();
                    continue;
                }
                CycleOutcome::Retryable(class) => {
                    self.summary.failures += 1;
                    let attempt = self.attempts.increment();

                    if attempt < self.config.max_attempts {
                        let ctx = self.config.backoff.context(attempt, class);
                        tracing::warn!(
                            attempt,
                            max_attempts = self.config.max_attempts,
                            ?class,
                            delay_ms = ctx.delay_ms(),
                            "session failed, retrying on same proxy"
                        );
                        self.emit(FarmEventKind::Backoff {
                            attempt,
                            delay: ctx.delay,
                            class,
                        });
                        if wait(ctx.delay, shutdown).await.is_cancelled() {
                            return Ok(self.summary);
                        }
                        continue;
                    }

                    let delay = self.config.farming_wait;
                    tracing::warn!(
                        attempt,
                        delay_ms = saturating_millis(delay),
                        "retries exhausted, cooling down"
                    );
                    self.emit(FarmEventKind::Cooldown { delay });
                    if wait(delay, shutdown).await.is_cancelled() {
                        return Ok(self.summary);
                    }

                    if let Some(next) = self.rotate()? {
                        (api, dialer) = self.factory.build(Some(&next))?;
                        self.proxy = Some(next);
                    }
                    self.attempts.reset();
                }
            }
        }
    }

    /// Picks a new proxy if rotation applies. `None` keeps the current one.
    fn rotate(&mut self) -> Result<Option<ProxyUri>, FarmError> {
        if !self.config.proxy_rotation {
            return Ok(None);
        }
        if self.rotation.pool().is_empty() && self.proxy.is_none() {
            // Direct connection with no proxies configured.
            return Ok(None);
        }
        let next = self.rotation.next(self.proxy.as_ref())?;
        if self.proxy.as_ref() == Some(&next) {
            tracing::info!(proxy = %next.masked(), "no alternative proxy, keeping current");
            return Ok(None);
        }

        let from = self.proxy.as_ref().map(ProxyUri::masked);
        tracing::info!(
            from = from.as_deref().unwrap_or("direct"),
            to = %next.masked(),
            "rotating proxy"
        );
        self.summary.rotations += 1;
        self.emit(FarmEventKind::ProxyRotated {
            from,
            to: next.masked(),
        });
        Ok(Some(next))
    }

    /// Steps 1-4 of one cycle.
    async fn cycle(
        &self,
        api: &F::Api,
        dialer: &F::Dialer,
        shutdown: &CancellationToken,
    ) -> CycleOutcome {
        if let Err(err) = self.ensure_bearer(api, shutdown).await {
            return self.failed("login", err);
        }

        let identity = self.identity().clone();
        let mut session = Session::new(identity.clone(), self.config.session.clone());
        if let Some(tx) = &self.events {
            session = session.with_events(Arc::new(SessionForward {
                identity,
                tx: tx.clone(),
            }));
        }

        if let Err(err) = session.connect(dialer, shutdown).await {
            return self.failed("connect", err);
        }

        let connector = Connector {
            signer: self.signer.as_ref(),
            api,
            store: self.store.as_ref(),
            clock: self.clock.as_ref(),
            extension_id: &self.config.session.extension_id,
        };
        if let Err(err) = session.authenticate(&connector, shutdown).await {
            session.disconnect().await;
            return self.failed("authenticate", err);
        }

        match session.run(shutdown).await.into_result() {
            Ok(()) => CycleOutcome::Success,
            Err(err) => {
                if matches!(err, SessionError::AuthRejected(_))
                    && session.auth_source() == Some(AuthSource::Cached)
                {
                    self.forget_cached_payload().await;
                }
                self.failed("session", err)
            }
        }
    }

    /// Step 1: make sure a bearer token is cached, logging in if needed.
    async fn ensure_bearer(
        &self,
        api: &F::Api,
        shutdown: &CancellationToken,
    ) -> Result<(), SessionError> {
        let identity = self.identity();
        let cached = match self.store.token(identity).await {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(error = %err, "reading bearer token failed, treating as absent");
                None
            }
        };
        if cached.is_some() {
            return Ok(());
        }

        let token = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(SessionError::Shutdown),
            token = login(
                api,
                self.signer.as_ref(),
                self.clock.as_ref(),
                &self.config.session.extension_id,
            ) => token?,
        };
        if let Err(err) = self.store.put_token(identity, &token).await {
            tracing::warn!(error = %err, "persisting bearer token failed");
        }
        tracing::info!("logged in");
        Ok(())
    }

    async fn forget_cached_payload(&self) {
        tracing::info!("cached auth payload was not acknowledged, discarding it");
        if let Err(err) = self.store.forget_auth_message(self.identity()).await {
            tracing::warn!(error = %err, "discarding cached auth payload failed");
        }
    }

    fn failed(&self, step: &'static str, err: SessionError) -> CycleOutcome {
        match err {
            SessionError::Shutdown => return CycleOutcome::Shutdown,
            SessionError::Sign(err) => {
                return CycleOutcome::Fatal(FarmError::Configuration(format!("signer: {err}")));
            }
            _ => {}
        }
        let class = err.class();
        tracing::warn!(step, error = %err, ?class, "cycle failed");
        CycleOutcome::Retryable(class)
    }

    fn masked_proxy(&self) -> String {
        self.proxy
            .as_ref()
            .map_or_else(|| "direct".to_owned(), ProxyUri::masked)
    }

    fn emit(&self, kind: FarmEventKind) {
        if let Some(tx) = &self.events {
            let _ = tx.send(FarmEvent {
                identity: self.identity().clone(),
                kind,
            });
        }
    }
}
