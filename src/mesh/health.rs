//! Per-service health snapshot: lock-free counters plus a fixed-size latency
//! ring buffer, grounded on `circuit_breaker.rs`'s time-based `VecDeque` window — the
//! direct precedent for bounding a rolling buffer by truncation rather than a crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const LATENCY_RING_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    pub success_rate: f64,
    pub average_latency: Duration,
    pub last_failure_time_millis: Option<u64>,
    pub total_requests: u64,
}

pub struct Health {
    successes: AtomicU64,
    failures: AtomicU64,
    last_failure_time_millis: AtomicU64,
    latencies: Mutex<VecDeque<Duration>>,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_failure_time_millis: AtomicU64::new(0),
            latencies: Mutex::new(VecDeque::with_capacity(LATENCY_RING_CAPACITY)),
        }
    }
}

impl Health {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, latency: Duration) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub fn record_failure(&self, latency: Duration, now_unix_millis: u64) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.last_failure_time_millis.store(now_unix_millis, Ordering::Relaxed);
        self.record_latency(latency);
    }

    fn record_latency(&self, latency: Duration) {
        let mut ring = self.latencies.lock().unwrap_or_else(|p| p.into_inner());
        if ring.len() == LATENCY_RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(latency);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let successes = self.successes.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let total = successes + failures;
        let success_rate = if total == 0 { 1.0 } else { successes as f64 / total as f64 };

        let ring = self.latencies.lock().unwrap_or_else(|p| p.into_inner());
        let average_latency = if ring.is_empty() {
            Duration::ZERO
        } else {
            ring.iter().sum::<Duration>() / ring.len() as u32
        };

        let last_failure = self.last_failure_time_millis.load(Ordering::Relaxed);
        HealthSnapshot {
            success_rate,
            average_latency,
            last_failure_time_millis: if last_failure == 0 { None } else { Some(last_failure) },
            total_requests: total,
        }
    }
}
