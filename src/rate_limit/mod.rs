//! Rate limiter (C3): five interchangeable admission strategies behind one trait.

pub mod store;
pub mod strategies;

pub use store::{InMemoryKv, KVStore, StoreError};
pub use strategies::{FixedWindowLimiter, LeakyBucketLimiter, SlidingWindowLimiter, TokenBucketLimiter};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of an admission decision.
#[derive(Debug, Clone, PartialEq)]
pub struct AllowResult {
    pub ok: bool,
    pub remaining: u64,
    pub reset_at_millis: u64,
    pub retry_after: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// The backing store could not complete the admission decision after exhausting
    /// its CAS retry budget; callers must treat this as a rejection (fail-closed).
    StoreFailed(String),
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoreFailed(msg) => write!(f, "rate limit store failed: {}", msg),
        }
    }
}

impl std::error::Error for RateLimitError {}

/// Shared interface across token bucket, sliding window, fixed window, leaky bucket,
/// and distributed rate limiters.
#[async_trait]
pub trait RateLimitStrategy: Send + Sync {
    async fn allow(&self, key: &str, n: u64) -> Result<AllowResult, RateLimitError>;
}

/// Maximum compare-and-swap retries before a [`DistributedLimiter`] fails closed.
const MAX_CAS_RETRIES: usize = 5;

/// Token-bucket admission backed by any [`KVStore`], admitting via compare-and-swap
/// exactly as the in-memory strategies admit via a mutex: read, compute, attempt to
/// commit, retry on conflict. Exhausting the retry budget returns `StoreFailed`
/// rather than allowing the request through (spec's documented fail-closed choice).
pub struct DistributedLimiter<K: KVStore> {
    store: Arc<K>,
    prefix: String,
    capacity: f64,
    rate_per_sec: f64,
}

impl<K: KVStore> DistributedLimiter<K> {
    pub fn new(store: Arc<K>, prefix: impl Into<String>, capacity: f64, rate_per_sec: f64) -> Self {
        Self { store, prefix: prefix.into(), capacity, rate_per_sec }
    }

    fn encode(tokens: f64, last_refill_millis: u64) -> Vec<u8> {
        format!("{}:{}", tokens, last_refill_millis).into_bytes()
    }

    fn decode(bytes: &[u8]) -> Option<(f64, u64)> {
        let s = std::str::from_utf8(bytes).ok()?;
        let (tokens, ts) = s.split_once(':')?;
        Some((tokens.parse().ok()?, ts.parse().ok()?))
    }

    fn now_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

#[async_trait]
impl<K: KVStore> RateLimitStrategy for DistributedLimiter<K> {
    async fn allow(&self, key: &str, n: u64) -> Result<AllowResult, RateLimitError> {
        let storage_key = format!("{}{}", self.prefix, key);
        let now = Self::now_millis();
        let cost = n as f64;

        for _ in 0..MAX_CAS_RETRIES {
            let current = self
                .store
                .get(&storage_key)
                .await
                .map_err(|e| RateLimitError::StoreFailed(e.to_string()))?;
            let (tokens, last_refill) = current.as_deref().and_then(Self::decode).unwrap_or((self.capacity, now));

            let elapsed_secs = now.saturating_sub(last_refill) as f64 / 1000.0;
            let refilled = (tokens + elapsed_secs * self.rate_per_sec).min(self.capacity);

            if refilled >= cost {
                let new_value = Self::encode(refilled - cost, now);
                let committed = self
                    .store
                    .cas(&storage_key, current, new_value, None)
                    .await
                    .map_err(|e| RateLimitError::StoreFailed(e.to_string()))?;
                if committed {
                    return Ok(AllowResult {
                        ok: true,
                        remaining: (refilled - cost).max(0.0) as u64,
                        reset_at_millis: now,
                        retry_after: None,
                    });
                }
                continue;
            }

            let missing = cost - refilled;
            let wait_secs = if self.rate_per_sec > 0.0 { missing / self.rate_per_sec } else { f64::MAX };
            return Ok(AllowResult {
                ok: false,
                remaining: refilled.max(0.0) as u64,
                reset_at_millis: now,
                retry_after: Some(Duration::from_secs_f64(wait_secs.min(3600.0))),
            });
        }

        Err(RateLimitError::StoreFailed(format!("CAS retries exhausted for key {}", key)))
    }
}
