//! Integration tests for the fleet supervisor.

mod support;

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use sprout_farm::{FarmConfig, FarmError, FarmExit, FleetSupervisor, StartDelay};
use sprout_policy::CancellationToken;
use sprout_session::{MemoryTokenStore, SystemClock};
use support::*;
use tokio::time::Instant;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn fleet_config(threads: usize, delay: StartDelay) -> FarmConfig {
    let mut cfg = FarmConfig::default();
    cfg.fleet.threads = threads;
    cfg.fleet.delay_before_start = delay;
    cfg
}

fn supervisor(
    config: &FarmConfig,
    factory: Arc<TestFactory>,
    proxies: Vec<sprout_transport::ProxyUri>,
) -> FleetSupervisor<TestFactory, MemoryTokenStore> {
    FleetSupervisor::new(
        config,
        "ext",
        factory,
        Arc::new(MemoryTokenStore::new()),
        Arc::new(SystemClock),
        proxies,
    )
    .unwrap()
    .with_rng(StdRng::seed_from_u64(7))
}

fn accounts(n: usize) -> Vec<Arc<dyn sprout_session::Signer>> {
    (0..n)
        .map(|i| TestSigner::shared(&format!("0x{i:040x}")))
        .collect()
}

#[test]
fn test_new_rejects_invalid_config() {
    let mut cfg = FarmConfig::default();
    cfg.fleet.threads = 0;
    let result = FleetSupervisor::new(
        &cfg,
        "ext",
        Arc::new(TestFactory::default()),
        Arc::new(MemoryTokenStore::new()),
        Arc::new(SystemClock),
        vec![],
    );
    assert!(matches!(result, Err(FarmError::Configuration(_))));
}

#[test]
fn test_initial_proxy_assigned_round_robin() {
    let cfg = FarmConfig::default();
    let fleet = supervisor(
        &cfg,
        Arc::new(TestFactory::default()),
        vec![proxy("alpha-proxy.net"), proxy("bravo-proxy.net")],
    );
    assert_eq!(fleet.initial_proxy(0).unwrap().host(), "alpha-proxy.net");
    assert_eq!(fleet.initial_proxy(1).unwrap().host(), "bravo-proxy.net");
    assert_eq!(fleet.initial_proxy(2).unwrap().host(), "alpha-proxy.net");
}

#[tokio::test(start_paused = true)]
async fn test_run_threads_limit_concurrent_accounts() {
    let cfg = fleet_config(2, StartDelay { min: 0, max: 0 });
    let factory = Arc::new(TestFactory::default());
    let fleet = supervisor(&cfg, factory.clone(), vec![]);
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(secs(1)).await;
        trigger.cancel();
    });

    let report = fleet.run(accounts(3), &shutdown).await;

    let started = report
        .accounts
        .iter()
        .filter(|(_, exit)| matches!(exit, FarmExit::Stopped(_)))
        .count();
    let waiting = report
        .accounts
        .iter()
        .filter(|(_, exit)| matches!(exit, FarmExit::NotStarted))
        .count();
    assert_eq!((started, waiting), (2, 1));
    assert_eq!(factory.network.dials().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_run_halted_account_frees_slot_for_next() {
    let cfg = fleet_config(1, StartDelay { min: 0, max: 0 });
    let factory = Arc::new(TestFactory {
        broken_hosts: vec!["alpha-proxy.net".into()],
        ..TestFactory::default()
    });
    let fleet = supervisor(
        &cfg,
        factory.clone(),
        vec![proxy("alpha-proxy.net"), proxy("bravo-proxy.net")],
    );
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(secs(1)).await;
        trigger.cancel();
    });

    let report = fleet.run(accounts(2), &shutdown).await;

    assert!(matches!(report.accounts[0].1, FarmExit::Halted(FarmError::Client(_))));
    assert!(matches!(report.accounts[1].1, FarmExit::Stopped(_)));
    assert_eq!(report.halted(), 1);
    let hosts: Vec<_> = factory
        .network
        .dials()
        .into_iter()
        .map(|(_, host)| host)
        .collect();
    assert_eq!(hosts, vec![Some("bravo-proxy.net".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_run_start_delay_is_interruptible() {
    let cfg = fleet_config(3, StartDelay { min: 100, max: 100 });
    let factory = Arc::new(TestFactory::default());
    let fleet = supervisor(&cfg, factory.clone(), vec![]);
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(secs(1)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let report = fleet.run(accounts(2), &shutdown).await;

    assert!(start.elapsed() < secs(2));
    assert!(
        report
            .accounts
            .iter()
            .all(|(_, exit)| matches!(exit, FarmExit::NotStarted))
    );
    assert!(factory.network.dials().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_report_keeps_account_order() {
    let cfg = fleet_config(3, StartDelay { min: 0, max: 3 });
    let fleet = supervisor(&cfg, Arc::new(TestFactory::default()), vec![]);
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let signers = accounts(3);
    let expected: Vec<_> = signers.iter().map(|s| s.identity().clone()).collect();
    let report = fleet.run(signers, &shutdown).await;

    let got: Vec<_> = report.accounts.iter().map(|(id, _)| id.clone()).collect();
    assert_eq!(got, expected);
}

#[test]
fn test_farm_config_parses_from_toml_with_defaults() {
    let cfg: FarmConfig = toml::from_str(
        r#"
        [retry]
        max_attempts = 5
        proxy_rotation = false

        [fleet]
        threads = 10
        delay_before_start = { min = 2, max = 4 }
        "#,
    )
    .unwrap();
    assert_eq!(cfg.retry.max_attempts, 5);
    assert!(!cfg.retry.proxy_rotation);
    assert_eq!(cfg.retry.delay_seconds, 5);
    assert_eq!(cfg.session.receive_timeout, 45);
    assert_eq!(cfg.fleet.delay_before_start, StartDelay { min: 2, max: 4 });
    assert!(cfg.validate().is_ok());
}
