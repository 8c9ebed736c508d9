//! Clock abstraction used by circuit breakers, rate limiters, and the token store.
//!
//! Everywhere a component reads "now", it goes through a `Clock` instead of calling
//! `Instant::now()`/`SystemTime::now()` directly so tests can inject deterministic time.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Clock abstraction so timing can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic milliseconds since some arbitrary epoch, used for relative timing
    /// (circuit breaker reset windows, rate limiter refill, bulkhead wait deadlines).
    fn now_millis(&self) -> u64;

    /// Wall-clock milliseconds since the Unix epoch, used for absolute timestamps
    /// (token `issuedAt`/`expiresAt`, blacklist entries, event timestamps).
    fn now_unix_millis(&self) -> u64;
}

/// Production clock backed by `Instant::now()` and `SystemTime::now()`.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
    start_unix_millis: u64,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        let start_unix_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self { start: Instant::now(), start_unix_millis }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn now_unix_millis(&self) -> u64 {
        self.start_unix_millis + self.start.elapsed().as_millis() as u64
    }
}

/// A clock whose value is set explicitly, for deterministic tests.
///
/// Both `now_millis` and `now_unix_millis` advance together from an internal offset;
/// tests that need a specific wall-clock instant can construct with `FakeClock::at(...)`.
#[derive(Debug, Clone)]
pub struct FakeClock {
    inner: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl FakeClock {
    /// Creates a fake clock starting at millisecond `0`.
    pub fn new() -> Self {
        Self { inner: std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0)) }
    }

    /// Creates a fake clock starting at the given Unix-epoch millisecond value.
    pub fn at(unix_millis: u64) -> Self {
        Self { inner: std::sync::Arc::new(std::sync::atomic::AtomicU64::new(unix_millis)) }
    }

    /// Advances the clock by `millis` and returns the new value.
    pub fn advance(&self, millis: u64) -> u64 {
        self.inner.fetch_add(millis, std::sync::atomic::Ordering::SeqCst) + millis
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now_millis(&self) -> u64 {
        self.inner.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn now_unix_millis(&self) -> u64 {
        self.inner.load(std::sync::atomic::Ordering::SeqCst)
    }
}
