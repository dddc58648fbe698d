//! Integration tests for the farming orchestrator.
//!
//! Every test runs on tokio's paused clock, so backoff, cooldown and
//! auth-ack waits are asserted in exact virtual seconds.

mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use sprout_farm::{
    AttemptCounter, FarmConfig, FarmError, FarmEvent, FarmEventKind, Orchestrator,
    OrchestratorConfig,
};
use sprout_policy::{CancellationToken, FailureClass, PolicyError};
use sprout_session::{Identity, MemoryTokenStore, SystemClock, TokenStore};
use sprout_transport::ProxyUri;
use support::*;
use tokio::sync::mpsc;
use tokio::time::Instant;

// =========================================================================
// Helpers
// =========================================================================

const ADDRESS: &str = "0x00000000000000000000000000000000000000aa";

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn config(max_attempts: u32, rotation: bool) -> OrchestratorConfig {
    let mut cfg = FarmConfig::default();
    cfg.retry.max_attempts = max_attempts;
    cfg.retry.proxy_rotation = rotation;
    cfg.orchestrator_config("ext").unwrap()
}

struct Setup {
    factory: Arc<TestFactory>,
    store: Arc<MemoryTokenStore>,
    events: mpsc::UnboundedReceiver<FarmEvent>,
    orchestrator: Orchestrator<TestFactory, MemoryTokenStore>,
}

fn setup(
    config: OrchestratorConfig,
    pool: Vec<ProxyUri>,
    start: Option<ProxyUri>,
    factory: TestFactory,
) -> Setup {
    let factory = Arc::new(factory);
    let store = Arc::new(MemoryTokenStore::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::new(
        TestSigner::shared(ADDRESS),
        factory.clone(),
        store.clone(),
        Arc::new(SystemClock),
        config,
        pool.into(),
    )
    .with_proxy(start)
    .with_rng(StdRng::seed_from_u64(1))
    .with_events(tx);
    Setup {
        factory,
        store,
        events: rx,
        orchestrator,
    }
}

fn cancel_after(shutdown: &CancellationToken, after: Duration) {
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        trigger.cancel();
    });
}

fn drain(rx: &mut mpsc::UnboundedReceiver<FarmEvent>) -> Vec<FarmEventKind> {
    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }
    kinds
}

fn offsets(dials: &[(Instant, Option<String>)], start: Instant) -> Vec<(u64, Option<&str>)> {
    dials
        .iter()
        .map(|(at, host)| ((*at - start).as_secs(), host.as_deref()))
        .collect()
}

// =========================================================================
// AttemptCounter
// =========================================================================

#[test]
fn test_attempt_counter_increments_and_resets() {
    let mut counter = AttemptCounter::default();
    assert_eq!(counter.increment(), 1);
    assert_eq!(counter.increment(), 2);
    counter.reset();
    assert_eq!(counter.get(), 0);
}

// =========================================================================
// Backoff, cooldown and rotation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_run_exhausted_retries_cool_down_then_rotate_and_reset() {
    let a = proxy("alpha-proxy.net");
    let b = proxy("bravo-proxy.net");
    let mut s = setup(
        config(3, true),
        vec![a.clone(), b.clone()],
        Some(a.clone()),
        TestFactory::default(),
    );
    let shutdown = CancellationToken::new();
    cancel_after(&shutdown, secs(76));

    let start = Instant::now();
    let summary = s.orchestrator.run(&shutdown).await.unwrap();

    // Backoff 5s, 10s on proxy A, then 60s cooldown, then proxy B.
    let dials = s.factory.network.dials();
    assert_eq!(
        offsets(&dials, start),
        vec![
            (0, Some("alpha-proxy.net")),
            (5, Some("alpha-proxy.net")),
            (15, Some("alpha-proxy.net")),
            (75, Some("bravo-proxy.net")),
        ]
    );
    assert_eq!(summary.rotations, 1);
    assert_eq!(summary.failures, 4);

    let kinds = drain(&mut s.events);
    let rotated = kinds
        .iter()
        .position(|k| matches!(k, FarmEventKind::ProxyRotated { .. }))
        .expect("rotation event");
    assert!(matches!(
        kinds[rotated - 1],
        FarmEventKind::Cooldown { delay } if delay == secs(60)
    ));
    assert_eq!(
        kinds[rotated],
        FarmEventKind::ProxyRotated {
            from: Some(a.masked()),
            to: b.masked(),
        }
    );
    assert_eq!(kinds[rotated + 1], FarmEventKind::CycleStarted { attempt: 0 });
    assert_eq!(kinds.last(), Some(&FarmEventKind::Stopped));
}

#[tokio::test(start_paused = true)]
async fn test_run_backoff_events_carry_growing_delays() {
    let mut s = setup(config(4, false), vec![], None, TestFactory::default());
    let shutdown = CancellationToken::new();
    cancel_after(&shutdown, secs(36));

    s.orchestrator.run(&shutdown).await.unwrap();

    let delays: Vec<_> = drain(&mut s.events)
        .into_iter()
        .filter_map(|k| match k {
            FarmEventKind::Backoff { attempt, delay, class } => {
                assert_eq!(class, FailureClass::Generic);
                Some((attempt, delay))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        delays,
        vec![(1, secs(5)), (2, secs(10)), (3, secs(20))],
        "attempt 4 hits the cooldown instead"
    );
}

#[tokio::test(start_paused = true)]
async fn test_run_rate_limited_failure_waits_fixed_delay() {
    let factory = TestFactory::default();
    factory.network.plan(Plan::RateLimited);
    factory.network.plan(Plan::RateLimited);
    let s = setup(config(5, false), vec![], None, factory);
    let shutdown = CancellationToken::new();
    cancel_after(&shutdown, secs(121));

    let start = Instant::now();
    s.orchestrator.run(&shutdown).await.unwrap();

    let at: Vec<_> = offsets(&s.factory.network.dials(), start)
        .into_iter()
        .map(|(t, _)| t)
        .collect();
    // 429, 429 (60s each), then a generic refusal at attempt 3: 20s.
    assert_eq!(at, vec![0, 60, 120]);
}

#[tokio::test(start_paused = true)]
async fn test_run_single_proxy_pool_keeps_proxy_and_resets_counter() {
    let only = proxy("only-proxy.net");
    let mut s = setup(
        config(1, true),
        vec![only.clone()],
        Some(only.clone()),
        TestFactory::default(),
    );
    let shutdown = CancellationToken::new();
    cancel_after(&shutdown, secs(61));

    let start = Instant::now();
    let summary = s.orchestrator.run(&shutdown).await.unwrap();

    assert_eq!(
        offsets(&s.factory.network.dials(), start),
        vec![(0, Some("only-proxy.net")), (60, Some("only-proxy.net"))]
    );
    assert_eq!(summary.rotations, 0);
    let kinds = drain(&mut s.events);
    assert!(!kinds.iter().any(|k| matches!(k, FarmEventKind::ProxyRotated { .. })));
    assert!(kinds.contains(&FarmEventKind::CycleStarted { attempt: 0 }));
    assert_eq!(s.factory.builds.lock().unwrap().len(), 1, "client not rebuilt");
}

#[tokio::test(start_paused = true)]
async fn test_run_rotation_disabled_keeps_proxy() {
    let a = proxy("alpha-proxy.net");
    let b = proxy("bravo-proxy.net");
    let s = setup(
        config(1, false),
        vec![a.clone(), b],
        Some(a),
        TestFactory::default(),
    );
    let shutdown = CancellationToken::new();
    cancel_after(&shutdown, secs(125));

    s.orchestrator.run(&shutdown).await.unwrap();

    assert!(
        s.factory
            .network
            .dials()
            .iter()
            .all(|(_, host)| host.as_deref() == Some("alpha-proxy.net"))
    );
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_run_shutdown_during_cooldown_returns_promptly() {
    let s = setup(config(1, true), vec![], None, TestFactory::default());
    let shutdown = CancellationToken::new();
    cancel_after(&shutdown, secs(10));

    let start = Instant::now();
    let summary = s.orchestrator.run(&shutdown).await.unwrap();

    assert_eq!(start.elapsed(), secs(10));
    assert_eq!(summary.cycles, 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_already_cancelled_never_dials() {
    let s = setup(config(3, true), vec![], None, TestFactory::default());
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let summary = s.orchestrator.run(&shutdown).await.unwrap();
    assert_eq!(summary.cycles, 0);
    assert!(s.factory.network.dials().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_shutdown_mid_session_closes_transport() {
    let factory = TestFactory::default();
    let (conn, peer) = connection();
    factory.network.plan(Plan::Serve(conn));
    peer.push(r#"{"type":"extension_auth","data":{"token":"T"}}"#);
    let s = setup(config(3, true), vec![], None, factory);
    let shutdown = CancellationToken::new();
    cancel_after(&shutdown, secs(40));

    let summary = s.orchestrator.run(&shutdown).await.unwrap();
    assert_eq!(summary.failures, 0);
    assert!(peer.closed.load(Ordering::SeqCst));
}

// =========================================================================
// Credentials
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_run_logs_in_once_and_caches_bearer() {
    let s = setup(config(5, false), vec![], None, TestFactory::default());
    let shutdown = CancellationToken::new();
    cancel_after(&shutdown, secs(16));

    s.orchestrator.run(&shutdown).await.unwrap();

    assert_eq!(s.factory.network.dials().len(), 3);
    assert_eq!(s.factory.logins.load(Ordering::SeqCst), 1);
    let token = s.store.token(&Identity::new(ADDRESS)).await.unwrap();
    assert_eq!(token.as_deref(), Some("bearer"));
}

#[tokio::test(start_paused = true)]
async fn test_run_unacknowledged_cached_payload_is_forgotten() {
    let factory = TestFactory::default();
    let (conn, _peer) = connection();
    factory.network.plan(Plan::Serve(conn));
    let s = setup(config(3, false), vec![], None, factory);
    let id = Identity::new(ADDRESS);
    s.store.put_token(&id, "bearer").await.unwrap();
    s.store
        .put_auth_message(&id, r#"{"userId":"x","message":"m","signature":"0xs"}"#)
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    cancel_after(&shutdown, secs(61));
    s.orchestrator.run(&shutdown).await.unwrap();

    assert_eq!(s.store.auth_message(&id).await.unwrap(), None);
}

// =========================================================================
// Configuration errors
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_run_rotation_with_empty_pool_halts() {
    let mut s = setup(
        config(3, true),
        vec![],
        Some(proxy("alpha-proxy.net")),
        TestFactory::default(),
    );
    let shutdown = CancellationToken::new();

    let err = s.orchestrator.run(&shutdown).await.unwrap_err();
    assert!(matches!(err, FarmError::Policy(PolicyError::EmptyPool)));
    assert!(s.factory.network.dials().is_empty());
    assert!(matches!(
        drain(&mut s.events).last(),
        Some(FarmEventKind::Halted { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_run_client_build_failure_halts() {
    let factory = TestFactory {
        broken_hosts: vec!["alpha-proxy.net".into()],
        ..TestFactory::default()
    };
    let a = proxy("alpha-proxy.net");
    let s = setup(config(3, true), vec![a.clone()], Some(a), factory);
    let shutdown = CancellationToken::new();

    let err = s.orchestrator.run(&shutdown).await.unwrap_err();
    assert!(matches!(err, FarmError::Client(_)));
}
