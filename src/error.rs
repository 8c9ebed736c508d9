//! Shared error type for the composite executor.
//!
//! Each resilience component keeps its own narrow error enum at its boundary
//! (`BulkheadError`, `CircuitBreakerError`, `RateLimitError`, ...); `ExecutorError<E>`
//! is the umbrella the composite chain (`executor::CompositeExecutor`) returns so
//! callers see one type instead of wiring `From` conversions between four of them.

use std::fmt;
use std::time::Duration;

/// Cap on the number of stored failures inside `RetryExhausted` to avoid unbounded growth.
pub const MAX_RETRY_FAILURES: usize = 10;

/// Unified error type returned by the composite executor (C7).
#[derive(Debug)]
pub enum ExecutorError<E> {
    /// A suspending operation exceeded its deadline.
    Timeout { elapsed: Duration, timeout: Duration },
    /// Cooperative cancellation fired before completion.
    Cancelled,
    /// The bulkhead rejected the operation due to capacity.
    BulkheadFull { in_flight: usize, max: usize },
    /// The rate limiter rejected the operation.
    RateLimitExceeded { retry_after: Duration },
    /// The circuit breaker is open.
    CircuitOpen { failure_count: usize, opened_at_millis: u64 },
    /// All retry attempts were exhausted.
    RetryExhausted { attempts: usize, failures: Vec<E> },
    /// The underlying business operation failed without tripping any policy.
    Inner(E),
}

impl<E: Clone> Clone for ExecutorError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Timeout { elapsed, timeout } => Self::Timeout { elapsed: *elapsed, timeout: *timeout },
            Self::Cancelled => Self::Cancelled,
            Self::BulkheadFull { in_flight, max } => Self::BulkheadFull { in_flight: *in_flight, max: *max },
            Self::RateLimitExceeded { retry_after } => Self::RateLimitExceeded { retry_after: *retry_after },
            Self::CircuitOpen { failure_count, opened_at_millis } => {
                Self::CircuitOpen { failure_count: *failure_count, opened_at_millis: *opened_at_millis }
            }
            Self::RetryExhausted { attempts, failures } => {
                Self::RetryExhausted { attempts: *attempts, failures: failures.clone() }
            }
            Self::Inner(e) => Self::Inner(e.clone()),
        }
    }
}

impl<E: PartialEq> PartialEq for ExecutorError<E> {
    fn eq(&self, other: &Self) -> bool {
        use ExecutorError::*;
        match (self, other) {
            (Timeout { elapsed: e1, timeout: t1 }, Timeout { elapsed: e2, timeout: t2 }) => e1 == e2 && t1 == t2,
            (Cancelled, Cancelled) => true,
            (BulkheadFull { in_flight: i1, max: m1 }, BulkheadFull { in_flight: i2, max: m2 }) => {
                i1 == i2 && m1 == m2
            }
            (RateLimitExceeded { retry_after: a }, RateLimitExceeded { retry_after: b }) => a == b,
            (
                CircuitOpen { failure_count: f1, opened_at_millis: o1 },
                CircuitOpen { failure_count: f2, opened_at_millis: o2 },
            ) => f1 == f2 && o1 == o2,
            (RetryExhausted { attempts: a1, failures: f1 }, RetryExhausted { attempts: a2, failures: f2 }) => {
                a1 == a2 && f1 == f2
            }
            (Inner(a), Inner(b)) => a == b,
            _ => false,
        }
    }
}

impl<E: Eq> Eq for ExecutorError<E> {}

impl<E: fmt::Display> fmt::Display for ExecutorError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { elapsed, timeout } => {
                write!(f, "operation timed out after {:?} (limit: {:?})", elapsed, timeout)
            }
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::BulkheadFull { in_flight, max } => {
                write!(f, "bulkhead rejected request ({} in-flight, max {})", in_flight, max)
            }
            Self::RateLimitExceeded { retry_after } => {
                write!(f, "rate limit exceeded, retry after {:?}", retry_after)
            }
            Self::CircuitOpen { failure_count, opened_at_millis } => {
                write!(
                    f,
                    "circuit breaker open ({} failures, opened at t={}ms)",
                    failure_count, opened_at_millis
                )
            }
            Self::RetryExhausted { attempts, failures } => {
                let last = failures.last().map(|e| e.to_string()).unwrap_or_default();
                write!(
                    f,
                    "retry exhausted after {} attempts ({} failures), last error: {}",
                    attempts,
                    failures.len(),
                    last
                )
            }
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ExecutorError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::RetryExhausted { failures, .. } => failures.last().map(|e| e as &dyn std::error::Error),
            _ => None,
        }
    }
}

impl<E> ExecutorError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_bulkhead_full(&self) -> bool {
        matches!(self, Self::BulkheadFull { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_inner_mut(&mut self) -> Option<&mut E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    pub fn failures(&self) -> Option<&[E]> {
        match self {
            Self::RetryExhausted { failures, .. } => Some(failures.as_slice()),
            _ => None,
        }
    }

    /// Whether a retry loop should count this error against its attempt budget and
    /// retry it. `CircuitOpen`, cancellation, and bulkhead-full errors are never
    /// retried; a rate-limit error is retryable only if `retry_after` fits inside
    /// whatever deadline budget remains.
    pub fn is_retryable(&self, remaining_budget: Option<Duration>) -> bool {
        match self {
            Self::Inner(_) => true,
            Self::Timeout { .. } => true,
            Self::RateLimitExceeded { retry_after } => match remaining_budget {
                Some(budget) => *retry_after <= budget,
                None => true,
            },
            Self::CircuitOpen { .. } | Self::Cancelled | Self::BulkheadFull { .. } | Self::RetryExhausted { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct DummyError(&'static str);

    impl fmt::Display for DummyError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for DummyError {}

    #[test]
    fn timeout_error_display() {
        let err: ExecutorError<io::Error> = ExecutorError::Timeout {
            elapsed: Duration::from_millis(5100),
            timeout: Duration::from_secs(5),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn bulkhead_full_display() {
        let err: ExecutorError<io::Error> = ExecutorError::BulkheadFull { in_flight: 50, max: 50 };
        let msg = format!("{}", err);
        assert!(msg.contains("bulkhead"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn circuit_open_error_display() {
        let err: ExecutorError<io::Error> =
            ExecutorError::CircuitOpen { failure_count: 10, opened_at_millis: 4200 };
        let msg = format!("{}", err);
        assert!(msg.contains("circuit breaker"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn retry_exhausted_display_includes_last_error() {
        let err: ExecutorError<DummyError> = ExecutorError::RetryExhausted {
            attempts: 3,
            failures: vec![DummyError("first"), DummyError("last")],
        };
        let msg = format!("{}", err);
        assert!(msg.contains('3'));
        assert!(msg.contains("last error"));
        assert!(msg.contains("last"));
    }

    #[test]
    fn circuit_open_is_never_retryable() {
        let err: ExecutorError<DummyError> =
            ExecutorError::CircuitOpen { failure_count: 3, opened_at_millis: 0 };
        assert!(!err.is_retryable(None));
    }

    #[test]
    fn rate_limited_retryable_only_within_budget() {
        let err: ExecutorError<DummyError> =
            ExecutorError::RateLimitExceeded { retry_after: Duration::from_secs(2) };
        assert!(err.is_retryable(Some(Duration::from_secs(5))));
        assert!(!err.is_retryable(Some(Duration::from_secs(1))));
    }

    #[test]
    fn inner_errors_are_retryable() {
        let err: ExecutorError<DummyError> = ExecutorError::Inner(DummyError("boom"));
        assert!(err.is_retryable(None));
    }

    #[test]
    fn into_inner_extracts_error() {
        let io_err = io::Error::new(io::ErrorKind::Other, "test");
        let err = ExecutorError::Inner(io_err);
        let extracted = err.into_inner().unwrap();
        assert_eq!(extracted.to_string(), "test");
    }

    #[test]
    fn source_returns_last_failure_for_retry_exhausted() {
        let err: ExecutorError<DummyError> = ExecutorError::RetryExhausted {
            attempts: 3,
            failures: vec![DummyError("a"), DummyError("b")],
        };
        let src = err.source().unwrap();
        assert_eq!(src.to_string(), "b");
    }

    #[test]
    fn as_inner_accessors_work() {
        let mut err: ExecutorError<DummyError> = ExecutorError::Inner(DummyError("x"));
        assert!(err.is_inner());
        assert_eq!(err.as_inner().unwrap().0, "x");
        if let Some(inner) = err.as_inner_mut() {
            inner.0 = "y";
        }
        assert_eq!(err.as_inner().unwrap().0, "y");
    }
}
