//! Rate limiter strategies. Each keeps one `*State` struct per key behind a
//! `dashmap::DashMap`, following `TokenBucket`'s optimistic-retry shape but widened
//! to a multi-key model.

use super::{AllowResult, RateLimitError, RateLimitStrategy};
use crate::clock::{Clock, MonotonicClock};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

struct TokenBucketState {
    tokens: f64,
    last_refill_millis: u64,
}

/// Refills continuously at `rate` tokens/sec up to `capacity`; deducts `n` on admit.
pub struct TokenBucketLimiter {
    capacity: f64,
    rate_per_sec: f64,
    clock: Arc<dyn Clock>,
    buckets: DashMap<String, Mutex<TokenBucketState>>,
}

impl TokenBucketLimiter {
    pub fn new(capacity: f64, rate_per_sec: f64) -> Self {
        Self { capacity, rate_per_sec, clock: Arc::new(MonotonicClock::default()), buckets: DashMap::new() }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl RateLimitStrategy for TokenBucketLimiter {
    async fn allow(&self, key: &str, n: u64) -> Result<AllowResult, RateLimitError> {
        let now = self.clock.now_millis();
        let cost = n as f64;

        let entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(TokenBucketState { tokens: self.capacity, last_refill_millis: now }));
        let mut state = entry.lock().unwrap_or_else(|p| p.into_inner());

        let elapsed_secs = (now.saturating_sub(state.last_refill_millis)) as f64 / 1000.0;
        let refilled = (state.tokens + elapsed_secs * self.rate_per_sec).min(self.capacity);
        state.last_refill_millis = now;

        if refilled >= cost {
            state.tokens = refilled - cost;
            Ok(AllowResult {
                ok: true,
                remaining: state.tokens.max(0.0) as u64,
                reset_at_millis: now,
                retry_after: None,
            })
        } else {
            state.tokens = refilled;
            let missing = cost - refilled;
            let wait_secs = if self.rate_per_sec > 0.0 { missing / self.rate_per_sec } else { f64::MAX };
            Ok(AllowResult {
                ok: false,
                remaining: refilled.max(0.0) as u64,
                reset_at_millis: now,
                retry_after: Some(Duration::from_secs_f64(wait_secs.min(3600.0))),
            })
        }
    }
}

struct SlidingWindowState {
    segments: VecDeque<(u64, u64)>,
}

/// A window of `window_size` split into `segment_count` equal segments; admits while
/// the sum of counts inside the trailing window stays under `limit`.
pub struct SlidingWindowLimiter {
    limit: u64,
    window: Duration,
    segment_count: u64,
    clock: Arc<dyn Clock>,
    buckets: DashMap<String, Mutex<SlidingWindowState>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: u64, window: Duration, segment_count: u64) -> Self {
        Self {
            limit,
            window,
            segment_count: segment_count.max(1),
            clock: Arc::new(MonotonicClock::default()),
            buckets: DashMap::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn segment_millis(&self) -> u64 {
        (self.window.as_millis() as u64 / self.segment_count).max(1)
    }
}

#[async_trait]
impl RateLimitStrategy for SlidingWindowLimiter {
    async fn allow(&self, key: &str, n: u64) -> Result<AllowResult, RateLimitError> {
        let now = self.clock.now_millis();
        let segment_millis = self.segment_millis();
        let current_segment = now / segment_millis;
        let window_millis = self.window.as_millis() as u64;

        let entry =
            self.buckets.entry(key.to_string()).or_insert_with(|| Mutex::new(SlidingWindowState { segments: VecDeque::new() }));
        let mut state = entry.lock().unwrap_or_else(|p| p.into_inner());

        while let Some(&(start, _)) = state.segments.front() {
            if now.saturating_sub(start) >= window_millis {
                state.segments.pop_front();
            } else {
                break;
            }
        }

        let total: u64 = state.segments.iter().map(|(_, c)| *c).sum();

        if total + n <= self.limit {
            match state.segments.back_mut() {
                Some((start, count)) if *start == current_segment * segment_millis => *count += n,
                _ => state.segments.push_back((current_segment * segment_millis, n)),
            }
            Ok(AllowResult { ok: true, remaining: self.limit - (total + n), reset_at_millis: now + window_millis, retry_after: None })
        } else {
            Ok(AllowResult {
                ok: false,
                remaining: 0,
                reset_at_millis: now + window_millis,
                retry_after: Some(millis_to_duration(segment_millis)),
            })
        }
    }
}

struct FixedWindowState {
    boundary: u64,
    count: u64,
}

/// Resets its counter every `window`, at `floor(now/window) * window` boundaries.
pub struct FixedWindowLimiter {
    limit: u64,
    window: Duration,
    clock: Arc<dyn Clock>,
    buckets: DashMap<String, Mutex<FixedWindowState>>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window, clock: Arc::new(MonotonicClock::default()), buckets: DashMap::new() }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl RateLimitStrategy for FixedWindowLimiter {
    async fn allow(&self, key: &str, n: u64) -> Result<AllowResult, RateLimitError> {
        let now = self.clock.now_millis();
        let window_millis = self.window.as_millis().max(1) as u64;
        let boundary = (now / window_millis) * window_millis;

        let entry = self.buckets.entry(key.to_string()).or_insert_with(|| Mutex::new(FixedWindowState { boundary, count: 0 }));
        let mut state = entry.lock().unwrap_or_else(|p| p.into_inner());

        if state.boundary != boundary {
            state.boundary = boundary;
            state.count = 0;
        }

        let reset_at = boundary + window_millis;

        if state.count + n <= self.limit {
            state.count += n;
            Ok(AllowResult { ok: true, remaining: self.limit - state.count, reset_at_millis: reset_at, retry_after: None })
        } else {
            Ok(AllowResult {
                ok: false,
                remaining: 0,
                reset_at_millis: reset_at,
                retry_after: Some(millis_to_duration(reset_at.saturating_sub(now))),
            })
        }
    }
}

struct LeakyBucketState {
    level: f64,
    last_leak_millis: u64,
}

/// Constant outflow rate; rejects once the backlog exceeds `capacity`.
pub struct LeakyBucketLimiter {
    capacity: f64,
    leak_rate_per_sec: f64,
    clock: Arc<dyn Clock>,
    buckets: DashMap<String, Mutex<LeakyBucketState>>,
}

impl LeakyBucketLimiter {
    pub fn new(capacity: f64, leak_rate_per_sec: f64) -> Self {
        Self { capacity, leak_rate_per_sec, clock: Arc::new(MonotonicClock::default()), buckets: DashMap::new() }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl RateLimitStrategy for LeakyBucketLimiter {
    async fn allow(&self, key: &str, n: u64) -> Result<AllowResult, RateLimitError> {
        let now = self.clock.now_millis();
        let cost = n as f64;

        let entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(LeakyBucketState { level: 0.0, last_leak_millis: now }));
        let mut state = entry.lock().unwrap_or_else(|p| p.into_inner());

        let elapsed_secs = now.saturating_sub(state.last_leak_millis) as f64 / 1000.0;
        let leaked = (state.level - elapsed_secs * self.leak_rate_per_sec).max(0.0);
        state.last_leak_millis = now;

        if leaked + cost <= self.capacity {
            state.level = leaked + cost;
            Ok(AllowResult {
                ok: true,
                remaining: (self.capacity - state.level).max(0.0) as u64,
                reset_at_millis: now,
                retry_after: None,
            })
        } else {
            state.level = leaked;
            let overflow = leaked + cost - self.capacity;
            let wait_secs = if self.leak_rate_per_sec > 0.0 { overflow / self.leak_rate_per_sec } else { f64::MAX };
            Ok(AllowResult {
                ok: false,
                remaining: (self.capacity - leaked).max(0.0) as u64,
                reset_at_millis: now,
                retry_after: Some(Duration::from_secs_f64(wait_secs.min(3600.0))),
            })
        }
    }
}
