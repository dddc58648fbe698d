//! Proxy rotation: pick a fresh egress proxy after repeated failures.
//!
//! The rotation keeps a per-orchestrator "used this cycle" set over a shared,
//! read-only pool:
//!
//! ```text
//! pool = [p1, p2, p3], current = p1
//!   next(p1) -> p2 or p3      used = {p1, p2}
//!   next(p2) -> p3            used = {p1, p2, p3}
//!   next(p3) -> exhausted: used = {p3}, reselect -> p1 or p2
//! ```
//!
//! A single-proxy pool keeps returning that proxy. Callers compare the result
//! with their current proxy to notice the no-op.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::PolicyError;

/// Stateful selector over a proxy pool.
#[derive(Debug)]
pub struct ProxyRotation<P, R = StdRng> {
    pool: Arc<[P]>,
    used: HashSet<P>,
    rng: R,
}

impl<P: Clone + Eq + Hash> ProxyRotation<P, StdRng> {
    /// Creates a rotation seeded from the operating system.
    pub fn new(pool: impl Into<Arc<[P]>>) -> Self {
        Self::with_rng(pool, StdRng::from_os_rng())
    }
}

impl<P: Clone + Eq + Hash, R: Rng> ProxyRotation<P, R> {
    /// Creates a rotation with an explicit random source.
    pub fn with_rng(pool: impl Into<Arc<[P]>>, rng: R) -> Self {
        Self {
            pool: pool.into(),
            used: HashSet::new(),
            rng,
        }
    }

    /// Picks the next proxy to use instead of `current`.
    ///
    /// `current` is marked used, then a proxy is chosen uniformly at random
    /// among those not used this cycle. When none remain, the used set is
    /// cleared (keeping `current`) and selection is retried once. If that
    /// still leaves nothing, `current` is returned unchanged.
    ///
    /// # Errors
    /// [`PolicyError::EmptyPool`] if the pool has no proxies.
    pub fn next(&mut self, current: Option<&P>) -> Result<P, PolicyError> {
        if self.pool.is_empty() {
            return Err(PolicyError::EmptyPool);
        }
        if let Some(current) = current {
            self.used.insert(current.clone());
        }

        if let Some(proxy) = self.pick() {
            return Ok(proxy);
        }

        tracing::debug!(pool = self.pool.len(), "all proxies used, resetting rotation");
        self.reset(current);
        if let Some(proxy) = self.pick() {
            return Ok(proxy);
        }

        Ok(current
            .cloned()
            .unwrap_or_else(|| self.pool[0].clone()))
    }

    /// Clears the used set, keeping `current` marked.
    pub fn reset(&mut self, current: Option<&P>) {
        self.used.clear();
        if let Some(current) = current {
            self.used.insert(current.clone());
        }
    }

    /// The full pool.
    pub fn pool(&self) -> &[P] {
        &self.pool
    }

    /// Whether `proxy` has been handed out (or was current) this cycle.
    pub fn is_used(&self, proxy: &P) -> bool {
        self.used.contains(proxy)
    }

    /// Number of proxies marked used this cycle.
    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    fn pick(&mut self) -> Option<P> {
        let eligible: Vec<&P> = self
            .pool
            .iter()
            .filter(|p| !self.used.contains(*p))
            .collect();
        if eligible.is_empty() {
            return None;
        }
        let chosen = eligible[self.rng.random_range(0..eligible.len())].clone();
        self.used.insert(chosen.clone());
        Some(chosen)
    }
}
