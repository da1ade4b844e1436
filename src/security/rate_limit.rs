//! Sliding-window rate limiting.
//!
//! A key is admitted if fewer than `max_requests` of its admissions fall
//! inside the trailing `window`. Timestamps at or beyond the window edge are
//! pruned before every decision; rejected calls are not recorded.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;

use crate::observability::metrics;

/// Metrics scope for callers that do not name one.
pub const DEFAULT_SCOPE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limit window must be greater than zero")]
    ZeroWindow,
}

/// Admission policy for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    max_requests: u32,
    window: Duration,
}

impl RateLimitPolicy {
    /// `max_requests = 0` is valid and rejects everything; a zero window is not.
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, RateLimitError> {
        if window.is_zero() {
            return Err(RateLimitError::ZeroWindow);
        }
        Ok(Self {
            max_requests,
            window,
        })
    }

    pub fn per_seconds(max_requests: u32, window_secs: u64) -> Result<Self, RateLimitError> {
        Self::new(max_requests, Duration::from_secs(window_secs))
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Storage substrate for sliding windows.
///
/// Implementations must prune, count and append as one atomic step per key.
/// A shared-store implementation does this in a single server-side script
/// against a per-key sorted set whose expiry is the window length.
#[async_trait]
pub trait SlidingWindowStore: Send + Sync {
    async fn try_acquire(&self, key: &str, policy: &RateLimitPolicy) -> bool;
}

/// In-process substrate. Resets on restart.
#[derive(Debug, Default)]
pub struct InMemoryWindowStore {
    windows: DashMap<String, VecDeque<Instant>>,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys seen so far.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    fn acquire_at(&self, key: &str, policy: &RateLimitPolicy, now: Instant) -> bool {
        // The entry guard holds the shard lock for the whole prune-count-append.
        let mut window = self.windows.entry(key.to_string()).or_default();

        while let Some(&oldest) = window.front() {
            if now.saturating_duration_since(oldest) >= policy.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= policy.max_requests as usize {
            return false;
        }
        window.push_back(now);
        true
    }
}

#[async_trait]
impl SlidingWindowStore for InMemoryWindowStore {
    async fn try_acquire(&self, key: &str, policy: &RateLimitPolicy) -> bool {
        self.acquire_at(key, policy, Instant::now())
    }
}

/// Per-key admission control over a pluggable store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SlidingWindowStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SlidingWindowStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryWindowStore::new()))
    }

    /// Returns true and records the call if `key` is under its limit.
    pub async fn is_allowed(&self, key: &str, policy: &RateLimitPolicy) -> bool {
        self.is_allowed_in(DEFAULT_SCOPE, key, policy).await
    }

    /// Like `is_allowed`, counting rejections under `scope`.
    pub async fn is_allowed_in(&self, scope: &'static str, key: &str, policy: &RateLimitPolicy) -> bool {
        let allowed = self.store.try_acquire(key, policy).await;
        if !allowed {
            tracing::debug!(
                scope,
                key = %key,
                max_requests = policy.max_requests,
                window_secs = policy.window.as_secs_f64(),
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(scope);
        }
        allowed
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

/// State for the per-client-IP middleware.
#[derive(Clone, Debug)]
pub struct RateLimitState {
    pub limiter: RateLimiter,
    pub policy: RateLimitPolicy,
}

/// Middleware function for per-IP rate limiting.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = addr.ip().to_string();

    if state.limiter.is_allowed_in("admin_api", &key, &state.policy).await {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, "Rate limit exceeded");
        (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[test]
    fn test_zero_window_rejected() {
        assert_eq!(
            RateLimitPolicy::per_seconds(10, 0).unwrap_err(),
            RateLimitError::ZeroWindow
        );
        assert!(RateLimitPolicy::per_seconds(0, 1).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window_scenario() {
        let limiter = RateLimiter::in_memory();
        let policy = RateLimitPolicy::per_seconds(3, 60).unwrap();

        assert!(limiter.is_allowed("userA", &policy).await); // t=0
        advance(Duration::from_secs(10)).await;
        assert!(limiter.is_allowed("userA", &policy).await); // t=10
        advance(Duration::from_secs(10)).await;
        assert!(limiter.is_allowed("userA", &policy).await); // t=20
        advance(Duration::from_secs(10)).await;
        assert!(!limiter.is_allowed("userA", &policy).await); // t=30
        advance(Duration::from_secs(31)).await;
        assert!(limiter.is_allowed("userA", &policy).await); // t=61
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_are_not_recorded() {
        let limiter = RateLimiter::in_memory();
        let policy = RateLimitPolicy::per_seconds(1, 10).unwrap();

        assert!(limiter.is_allowed("k", &policy).await);
        for _ in 0..5 {
            advance(Duration::from_secs(1)).await;
            assert!(!limiter.is_allowed("k", &policy).await);
        }
        // Only the t=0 admission counts, so t=10 is free again.
        advance(Duration::from_secs(5)).await;
        assert!(limiter.is_allowed("k", &policy).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_drain_after_window() {
        let limiter = RateLimiter::in_memory();
        let policy = RateLimitPolicy::per_seconds(5, 1).unwrap();

        for _ in 0..5 {
            assert!(limiter.is_allowed("ip", &policy).await);
        }
        assert!(!limiter.is_allowed("ip", &policy).await);

        advance(Duration::from_secs(1)).await;
        for _ in 0..5 {
            assert!(limiter.is_allowed("ip", &policy).await);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_always_rejects() {
        let limiter = RateLimiter::in_memory();
        let policy = RateLimitPolicy::per_seconds(0, 60).unwrap();
        assert!(!limiter.is_allowed("anyone", &policy).await);
        advance(Duration::from_secs(120)).await;
        assert!(!limiter.is_allowed("anyone", &policy).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let store = Arc::new(InMemoryWindowStore::new());
        let limiter = RateLimiter::new(store.clone());
        let policy = RateLimitPolicy::per_seconds(1, 60).unwrap();

        assert!(limiter.is_allowed("a", &policy).await);
        assert!(!limiter.is_allowed("a", &policy).await);
        assert!(limiter.is_allowed("b", &policy).await);
        assert_eq!(store.tracked_keys(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_never_exceed_limit() {
        let limiter = RateLimiter::in_memory();
        let policy = RateLimitPolicy::per_seconds(10, 3600).unwrap();

        let mut handles = Vec::new();
        for _ in 0..100 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.is_allowed("shared", &policy).await
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }

    /// Captures `plane_rate_limited_total` increments by scope.
    #[derive(Default)]
    struct ScopeRecorder {
        hits: Arc<std::sync::Mutex<Vec<String>>>,
    }

    struct ScopeCounter {
        scope: String,
        hits: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl ::metrics::CounterFn for ScopeCounter {
        fn increment(&self, _value: u64) {
            self.hits.lock().unwrap().push(self.scope.clone());
        }

        fn absolute(&self, _value: u64) {}
    }

    impl ::metrics::Recorder for ScopeRecorder {
        fn describe_counter(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}
        fn describe_gauge(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}
        fn describe_histogram(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}

        fn register_counter(&self, key: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Counter {
            if key.name() != "plane_rate_limited_total" {
                return ::metrics::Counter::noop();
            }
            let scope = key
                .labels()
                .find(|l| l.key() == "scope")
                .map(|l| l.value().to_string())
                .unwrap_or_default();
            ::metrics::Counter::from_arc(Arc::new(ScopeCounter {
                scope,
                hits: self.hits.clone(),
            }))
        }

        fn register_gauge(&self, _: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Gauge {
            ::metrics::Gauge::noop()
        }

        fn register_histogram(&self, _: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Histogram {
            ::metrics::Histogram::noop()
        }
    }

    #[test]
    fn test_rejections_are_counted_by_scope() {
        let recorder = ScopeRecorder::default();
        ::metrics::with_local_recorder(&recorder, || {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let limiter = RateLimiter::in_memory();
                let policy = RateLimitPolicy::per_seconds(1, 60).unwrap();

                assert!(limiter.is_allowed("userA", &policy).await);
                assert!(!limiter.is_allowed("userA", &policy).await);
                assert!(!limiter.is_allowed_in("admin_api", "userA", &policy).await);
            });
        });

        let hits = recorder.hits.lock().unwrap().clone();
        assert_eq!(hits, vec![DEFAULT_SCOPE.to_string(), "admin_api".to_string()]);
    }
}
