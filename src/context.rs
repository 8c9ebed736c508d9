//! Cancellation context threaded through every suspending operation.
//!
//! Bounded, validated deadlines combined with `tokio::time::timeout` usage into a
//! single value that every suspension point (bulkhead wait, retry sleep, half-open
//! probe wait, blocking store call) can race against.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Maximum allowed deadline horizon (30 days), guarding against accidental
/// `Duration::MAX`-style deadlines.
pub const MAX_DEADLINE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug)]
struct Inner {
    deadline: Option<Instant>,
    cancelled: std::sync::atomic::AtomicBool,
    notify: Notify,
}

/// A cooperative cancellation context: an optional deadline plus a cancel flag that
/// can be set by a caller holding a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

/// A handle that can cancel the [`Context`] it was created from.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

impl Context {
    /// A context with no deadline and no cancellation.
    pub fn background() -> Self {
        Self {
            inner: Arc::new(Inner {
                deadline: None,
                cancelled: std::sync::atomic::AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        let timeout = timeout.min(MAX_DEADLINE);
        Self {
            inner: Arc::new(Inner {
                deadline: Some(Instant::now() + timeout),
                cancelled: std::sync::atomic::AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// A context plus a handle the caller can use to cancel it on demand.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let inner = Arc::new(Inner {
            deadline: None,
            cancelled: std::sync::atomic::AtomicBool::new(false),
            notify: Notify::new(),
        });
        (Self { inner: inner.clone() }, CancelHandle { inner })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Remaining budget before the deadline, or `None` if unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(std::sync::atomic::Ordering::Acquire) {
            return true;
        }
        matches!(self.inner.deadline, Some(d) if Instant::now() >= d)
    }

    /// Races `fut` against cancellation/deadline, returning `Err(())` if the context
    /// fires first. Callers map that into `Cancelled` or `Timeout` depending on which
    /// condition actually triggered, via [`Context::is_cancelled`] and `deadline`.
    pub async fn race<F, T>(&self, fut: F) -> Result<T, ExpiryKind>
    where
        F: Future<Output = T>,
    {
        if self.inner.cancelled.load(std::sync::atomic::Ordering::Acquire) {
            return Err(ExpiryKind::Cancelled);
        }
        match self.inner.deadline {
            None => {
                tokio::select! {
                    biased;
                    _ = self.inner.notify.notified() => Err(ExpiryKind::Cancelled),
                    out = fut => Ok(out),
                }
            }
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.inner.notify.notified() => Err(ExpiryKind::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => Err(ExpiryKind::Timeout),
                    out = fut => Ok(out),
                }
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

/// Which condition caused [`Context::race`] to short-circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryKind {
    Cancelled,
    Timeout,
}

impl CancelHandle {
    /// Cancels the associated context; idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, std::sync::atomic::Ordering::Release);
        self.inner.notify.notify_waiters();
    }
}
