//! Per-client rate limiting.
//!
//! # Responsibilities
//! - Admit or reject each request with a per-client token bucket
//! - Evict idle clients on a fixed interval to bound memory
//!
//! # Design Decisions
//! - Buckets live in a sharded map: one client's refill/consume is serialized
//!   by its shard lock, different clients rarely contend
//! - Buckets start full and are created on first sight of a client
//! - `last_seen` is refreshed on every request, admitted or not, so a client
//!   that keeps hammering while throttled is never evicted and re-created full

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::RateLimitConfig;
use crate::http::outcome::Outcome;
use crate::http::response;
use crate::observability::metrics;

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    fn try_acquire(&mut self, now: Instant, capacity: f64, refill_rate: f64) -> bool {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;
        self.last_seen = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Token-bucket rate limiter keyed by client.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    capacity: f64,
    refill_rate: f64,
    idle_timeout: Duration,
    sweep_interval: Duration,
}

impl RateLimiter {
    pub fn new(
        capacity: u32,
        refill_rate: f64,
        idle_timeout: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: capacity as f64,
            refill_rate,
            idle_timeout,
            sweep_interval,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.capacity,
            config.refill_per_second,
            Duration::from_secs(config.idle_timeout_secs),
            Duration::from_secs(config.sweep_interval_secs),
        )
    }

    /// Consume one token for `key`. Returns false when the bucket is empty.
    pub fn admit(&self, key: &str) -> bool {
        let now = Instant::now();

        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return bucket.try_acquire(now, self.capacity, self.refill_rate);
        }

        self.buckets
            .entry(key.to_owned())
            .or_insert_with(|| TokenBucket::new(self.capacity, now))
            .try_acquire(now, self.capacity, self.refill_rate)
    }

    /// [`admit`](Self::admit) as a tagged outcome.
    pub fn admission(&self, key: &str) -> Outcome {
        if self.admit(key) {
            Outcome::Admitted
        } else {
            Outcome::RateLimited
        }
    }

    /// Remove buckets idle for longer than the idle timeout.
    /// Returns the number of evicted clients.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_seen) <= self.idle_timeout);
        let removed = before.saturating_sub(self.buckets.len());
        metrics::record_rate_limiter_clients(self.buckets.len());
        removed
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Run [`sweep`](Self::sweep) every sweep interval until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let period = limiter.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            tracing::debug!(interval = ?period, "Rate limiter sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = limiter.len(), "Evicted idle rate limit buckets");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Rate limiter sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}

/// Middleware rejecting requests whose client has no tokens left.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = client_key(&request);

    match limiter.admission(&key) {
        Outcome::Admitted => next.run(request).await,
        outcome => {
            tracing::warn!(client = %key, "Rate limit exceeded");
            metrics::record_rate_limited();
            let mut response = response::rate_limited();
            response.extensions_mut().insert(outcome);
            response
        }
    }
}

/// Rate-limit subject for a request: the peer IP address.
pub fn client_key(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
