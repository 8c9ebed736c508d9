//! Sleeping as a cancellable, context-aware suspension point.
//!
//! Rather than a bare `sleep(duration)` that callers wrap in [`Context::race`]
//! themselves, [`Sleeper::sleep`] takes the [`Context`] directly and folds the race
//! in, the same way every other suspension point in this crate (bulkhead wait,
//! half-open probe wait) is expressed against a `Context` rather than a raw
//! `Duration`. Enables fast, deterministic tests without real time delays.

use crate::context::{Context, ExpiryKind};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Abstraction for sleeping/waiting, racing against cancellation/deadline.
#[async_trait]
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    async fn sleep(&self, ctx: &Context, duration: Duration) -> Result<(), ExpiryKind>;
}

/// Production sleeper using the tokio runtime, racing the real delay against `ctx`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, ctx: &Context, duration: Duration) -> Result<(), ExpiryKind> {
        ctx.race(tokio::time::sleep(duration)).await
    }
}

/// Test sleeper that never actually waits; still observes an already-fired `ctx`.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, ctx: &Context, _duration: Duration) -> Result<(), ExpiryKind> {
        if ctx.is_cancelled() {
            Err(ExpiryKind::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Test sleeper that records every requested duration without waiting.
#[derive(Debug, Clone)]
pub struct TrackingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl TrackingSleeper {
    pub fn new() -> Self {
        Self { calls: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Number of recorded sleep calls.
    pub fn calls(&self) -> usize {
        self.calls.lock().expect("TrackingSleeper.calls: mutex poisoned").len()
    }

    /// Get a recorded call duration by index, if present.
    pub fn call_at(&self, index: usize) -> Option<Duration> {
        self.calls.lock().expect("TrackingSleeper.call_at: mutex poisoned").get(index).copied()
    }

    pub fn clear(&self) {
        self.calls.lock().expect("TrackingSleeper.clear: mutex poisoned").clear();
    }
}

impl Default for TrackingSleeper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sleeper for TrackingSleeper {
    async fn sleep(&self, ctx: &Context, duration: Duration) -> Result<(), ExpiryKind> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(duration);
        if ctx.is_cancelled() {
            Err(ExpiryKind::Cancelled)
        } else {
            Ok(())
        }
    }
}
