//! Token bucket admission gate.
//!
//! One bucket per (client IP, key). Keys are `rpc_all`, `rpc_batch` or a
//! method name, so a single client is limited overall and per method.

use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::config::RateLimitConfig;
use crate::ports::outbound::{AdmissionGate, GateContext};

/// Key charged for every single call
pub const KEY_ALL: &str = "rpc_all";
/// Key charged for batches, weighted by batch length
pub const KEY_BATCH: &str = "rpc_batch";

struct TokenBucket {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    /// Last access time (for cleanup)
    last_access: Instant,
}

impl TokenBucket {
    fn new(config: &RateLimitConfig) -> Self {
        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(rate);

        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
            last_access: Instant::now(),
        }
    }

    fn check(&mut self, weight: NonZeroU32) -> bool {
        self.last_access = Instant::now();
        // A weight above the burst size can never be satisfied
        matches!(self.limiter.check_n(weight), Ok(Ok(())))
    }
}

/// Rate limiting gate shared across requests
pub struct RateLimitGate {
    buckets: DashMap<(IpAddr, String), TokenBucket>,
    config: RateLimitConfig,
}

impl RateLimitGate {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    /// Drop buckets idle for at least `max_age`
    pub fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.buckets.retain(|(ip, key), bucket| {
            let age = now.duration_since(bucket.last_access);
            if age >= max_age {
                debug!(ip = %ip, key = %key, age_secs = age.as_secs(), "Removing stale rate limit bucket");
                false
            } else {
                true
            }
        });
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Spawn [`cleanup_task`] with the configured interval and idle timeout
    pub fn spawn_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(cleanup_task(
            Arc::clone(self),
            self.config.cleanup_interval,
            self.config.idle_timeout,
        ))
    }
}

impl AdmissionGate for RateLimitGate {
    fn allow(&self, ctx: &GateContext, key: &str, weight: u32) -> bool {
        if !self.config.enabled {
            return true;
        }
        let Some(weight) = NonZeroU32::new(weight) else {
            return true;
        };

        let mut bucket = self
            .buckets
            .entry((ctx.client_ip, key.to_string()))
            .or_insert_with(|| {
                debug!(ip = %ctx.client_ip, key = key, "Creating new rate limit bucket");
                TokenBucket::new(&self.config)
            });

        bucket.check(weight)
    }

    fn is_whitelisted(&self, ctx: &GateContext) -> bool {
        self.config.whitelist.contains(&ctx.client_ip)
    }
}

/// Admission for a single call: whitelisted clients pass, everyone else must
/// pass both the overall and the per-method limit.
pub fn admit_call(gate: &dyn AdmissionGate, ctx: &GateContext, method: &str) -> bool {
    if gate.is_whitelisted(ctx) {
        return true;
    }
    gate.allow(ctx, KEY_ALL, 1) && gate.allow(ctx, method, 1)
}

/// Admission for a batch of `len` calls.
pub fn admit_batch(gate: &dyn AdmissionGate, ctx: &GateContext, len: usize) -> bool {
    let weight = u32::try_from(len).unwrap_or(u32::MAX);
    gate.is_whitelisted(ctx) || gate.allow(ctx, KEY_BATCH, weight)
}

/// Background task to clean up stale rate limit buckets
pub async fn cleanup_task(gate: Arc<RateLimitGate>, interval: Duration, max_age: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        gate.cleanup(max_age);
    }
}
