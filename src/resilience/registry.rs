//! Process-wide breaker registry keyed by dependency name.
//!
//! Built once at startup and shared through `Arc`. Breakers are created
//! lazily on first use and are never removed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::BreakerConfig;
use crate::resilience::circuit_breaker::{BreakerError, BreakerSnapshot, CircuitBreaker};

#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    defaults: BreakerConfig,
    overrides: HashMap<String, BreakerConfig>,
}

impl BreakerRegistry {
    pub fn new(defaults: BreakerConfig) -> Self {
        Self::with_overrides(defaults, HashMap::new())
    }

    /// Registry whose breakers take per-name thresholds from `overrides`.
    pub fn with_overrides(defaults: BreakerConfig, overrides: HashMap<String, BreakerConfig>) -> Self {
        Self {
            breakers: DashMap::new(),
            defaults,
            overrides,
        }
    }

    /// Get the breaker for `name`, creating it on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = self.overrides.get(name).unwrap_or(&self.defaults).clone();
                tracing::debug!(
                    breaker = %name,
                    failure_threshold = config.failure_threshold,
                    recovery_timeout_secs = config.recovery_timeout_secs,
                    success_threshold = config.success_threshold,
                    "Circuit breaker created"
                );
                Arc::new(CircuitBreaker::new(name, config))
            })
            .clone()
    }

    /// Run `operation` through the breaker named `name`.
    pub async fn call<F, Fut, T, E>(&self, name: &str, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = self.get_or_create(name);
        breaker.call(operation).await
    }

    /// Diagnostics for one breaker. Unknown names are not created.
    pub fn get_state_info(&self, name: &str) -> Option<BreakerSnapshot> {
        self.breakers.get(name).map(|b| b.snapshot())
    }

    /// Diagnostics for every breaker, sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut all: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Returns false if no breaker has that name.
    pub fn reset(&self, name: &str) -> bool {
        match self.breakers.get(name) {
            Some(b) => {
                b.reset();
                true
            }
            None => false,
        }
    }

    /// Returns false if no breaker has that name.
    pub fn force_open(&self, name: &str) -> bool {
        match self.breakers.get(name) {
            Some(b) => {
                b.force_open();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
