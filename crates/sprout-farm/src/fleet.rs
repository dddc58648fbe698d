//! Fleet supervisor: one orchestrator per account, bounded concurrency.
//!
//! Each account waits for a permit from a semaphore sized by
//! `fleet.threads`, then for a random start delay, then farms until shutdown.
//! The permit is held for the orchestrator's whole life, so `threads` caps
//! the number of simultaneously open sessions. An account that halts on a
//! configuration error releases its permit to the next waiting account.
//!
//! # Proxies
//!
//! Account `i` starts on proxy `i mod len`; from there its orchestrator
//! rotates on its own, over the same shared pool.
//!
//! # Shutdown
//!
//! [`FleetSupervisor::run`] returns once every task has finished. Accounts
//! still waiting for a permit or for their start delay when the token fires
//! report [`FarmExit::NotStarted`] without dialing.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sprout_policy::{CancellationToken, wait};
use sprout_session::{Clock, Identity, Signer, TokenStore};
use sprout_transport::ProxyUri;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::event::FarmEvents;
use crate::{ClientFactory, FarmConfig, FarmError, FarmSummary, Orchestrator, OrchestratorConfig};

/// How one account's farming ended.
#[derive(Debug)]
pub enum FarmExit {
    /// Shutdown arrived before the account got to start.
    NotStarted,
    /// Farmed until shutdown.
    Stopped(FarmSummary),
    /// Halted on a configuration error.
    Halted(FarmError),
    /// The task panicked.
    Crashed(String),
}

/// Per-account results, in account order.
#[derive(Debug, Default)]
pub struct FleetReport {
    pub accounts: Vec<(Identity, FarmExit)>,
}

impl FleetReport {
    /// Accounts that halted or crashed.
    pub fn halted(&self) -> usize {
        self.accounts
            .iter()
            .filter(|(_, exit)| matches!(exit, FarmExit::Halted(_) | FarmExit::Crashed(_)))
            .count()
    }
}

/// Runs many orchestrators concurrently.
pub struct FleetSupervisor<F: ClientFactory, T> {
    factory: Arc<F>,
    store: Arc<T>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    threads: usize,
    start_delay: (u64, u64),
    proxies: Arc<[ProxyUri]>,
    rng: StdRng,
    events: Option<FarmEvents>,
}

impl<F: ClientFactory, T: TokenStore> FleetSupervisor<F, T> {
    /// Builds a supervisor from validated configuration.
    pub fn new(
        config: &FarmConfig,
        extension_id: &str,
        factory: Arc<F>,
        store: Arc<T>,
        clock: Arc<dyn Clock>,
        proxies: Vec<ProxyUri>,
    ) -> Result<Self, FarmError> {
        let orchestrator = config.orchestrator_config(extension_id)?;
        let delay = config.fleet.delay_before_start;
        Ok(Self {
            factory,
            store,
            clock,
            config: orchestrator,
            threads: config.fleet.threads,
            start_delay: (delay.min, delay.max),
            proxies: proxies.into(),
            rng: StdRng::from_os_rng(),
            events: None,
        })
    }

    /// Replaces the random source for start delays and proxy selection.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_events(mut self, events: FarmEvents) -> Self {
        self.events = Some(events);
        self
    }

    /// Proxy assigned to the account at `index`.
    pub fn initial_proxy(&self, index: usize) -> Option<ProxyUri> {
        if self.proxies.is_empty() {
            None
        } else {
            Some(self.proxies[index % self.proxies.len()].clone())
        }
    }

    /// Farms every account until shutdown, then reports per account.
    pub async fn run(
        mut self,
        accounts: Vec<Arc<dyn Signer>>,
        shutdown: &CancellationToken,
    ) -> FleetReport {
        let permits = Arc::new(Semaphore::new(self.threads));
        let mut tasks = JoinSet::new();
        let identities: Vec<Identity> = accounts.iter().map(|s| s.identity().clone()).collect();

        tracing::info!(
            accounts = accounts.len(),
            threads = self.threads,
            proxies = self.proxies.len(),
            "starting fleet"
        );

        for (index, signer) in accounts.into_iter().enumerate() {
            let delay = Duration::from_secs(self.rng.random_range(self.start_delay.0..=self.start_delay.1));
            let mut orchestrator = Orchestrator::new(
                signer,
                self.factory.clone(),
                self.store.clone(),
                self.clock.clone(),
                self.config.clone(),
                self.proxies.clone(),
            )
            .with_proxy(self.initial_proxy(index))
            .with_rng(StdRng::from_rng(&mut self.rng));
            if let Some(tx) = &self.events {
                orchestrator = orchestrator.with_events(tx.clone());
            }

            let permits = permits.clone();
            let shutdown = shutdown.clone();
            tasks.spawn(async move {
                let exit = farm_account(orchestrator, permits, delay, &shutdown).await;
                (index, exit)
            });
        }

        let mut exits: Vec<Option<FarmExit>> = identities.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, exit)) => exits[index] = Some(exit),
                Err(err) => tracing::error!(error = %err, "farming task failed"),
            }
        }

        let report = FleetReport {
            accounts: identities
                .into_iter()
                .zip(exits)
                .map(|(id, exit)| {
                    (id, exit.unwrap_or_else(|| FarmExit::Crashed("task panicked".into())))
                })
                .collect(),
        };
        tracing::info!(
            accounts = report.accounts.len(),
            halted = report.halted(),
            "fleet stopped"
        );
        report
    }
}

async fn farm_account<F: ClientFactory, T: TokenStore>(
    orchestrator: Orchestrator<F, T>,
    permits: Arc<Semaphore>,
    delay: Duration,
    shutdown: &CancellationToken,
) -> FarmExit {
    let _permit = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return FarmExit::NotStarted,
        permit = permits.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return FarmExit::NotStarted,
        },
    };

    if !delay.is_zero() {
        tracing::info!(
            identity = %orchestrator.identity(),
            delay_s = delay.as_secs(),
            "waiting before start"
        );
        if wait(delay, shutdown).await.is_cancelled() {
            return FarmExit::NotStarted;
        }
    }

    match orchestrator.run(shutdown).await {
        Ok(summary) => FarmExit::Stopped(summary),
        Err(err) => FarmExit::Halted(err),
    }
}
