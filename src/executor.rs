//! Composite executor (C7): chains admission and resilience policies in fixed order
//! **bulkhead → rate-limit → retry → circuit-breaker → business fn**.
//!
//! Admission control runs before work is attempted, and retries observe circuit
//! state from the inside so a tripped breaker doesn't burn retry attempts
//! pointlessly; the ordering rationale is spelled out in DESIGN.md. Built on an
//! inside-out future composition via a shared `Arc<Mutex<Op>>` and an optional-layer
//! builder (`no_circuit_breaker`/`unlimited_bulkhead`).

use crate::bulkhead::BulkheadPolicy;
use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy};
use crate::context::Context;
use crate::error::ExecutorError;
use crate::events::{Event, EventBus, EventStatus, EventType};
use crate::rate_limit::{RateLimitError, RateLimitStrategy};
use crate::retry::RetryPolicy;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const RATE_LIMIT_STORE_FAILURE_RETRY_AFTER: Duration = Duration::from_secs(u64::MAX / 2_000_000_000);

#[derive(Clone)]
pub struct CompositeExecutor<E> {
    bulkhead: BulkheadPolicy,
    rate_limit: Option<(Arc<dyn RateLimitStrategy>, Arc<str>)>,
    retry: RetryPolicy<E>,
    circuit_breaker: CircuitBreakerPolicy,
    events: Option<EventBus>,
}

impl<E> CompositeExecutor<E>
where
    E: std::error::Error + Send + Sync + Clone + 'static,
{
    pub fn builder() -> CompositeExecutorBuilder<E> {
        CompositeExecutorBuilder::new()
    }

    fn emit(&self, action: &str, status: EventStatus, message: Option<String>) {
        if let Some(events) = &self.events {
            let mut event = Event::new(uuid::Uuid::new_v4().to_string(), EventType::System, action, status);
            if let Some(msg) = message {
                event = event.with_message(msg);
            }
            events.publish(event);
        }
    }

    /// Runs `operation` through the full chain. `rate_limit_key` is only consulted
    /// when a rate limiter is configured.
    pub async fn execute<T, Fut, Op>(&self, ctx: &Context, operation: Op) -> Result<T, ExecutorError<E>>
    where
        T: Send,
        Fut: Future<Output = Result<T, ExecutorError<E>>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        self.emit("request.received", EventStatus::Success, None);
        let started = Instant::now();

        let op_cell = Arc::new(Mutex::new(operation));
        let bulkhead = self.bulkhead.clone();
        let rate_limit = self.rate_limit.clone();
        let retry = self.retry.clone();
        let circuit_breaker = self.circuit_breaker.clone();

        let result = bulkhead
            .execute(ctx, || {
                let op_cell = op_cell.clone();
                let rate_limit = rate_limit.clone();
                let retry = retry.clone();
                let circuit_breaker = circuit_breaker.clone();
                let ctx = ctx.clone();
                async move {
                    if let Some((limiter, key)) = &rate_limit {
                        match limiter.allow(key, 1).await {
                            Ok(decision) if decision.ok => {}
                            Ok(decision) => {
                                return Err(ExecutorError::RateLimitExceeded {
                                    retry_after: decision.retry_after.unwrap_or_default(),
                                })
                            }
                            Err(RateLimitError::StoreFailed(_)) => {
                                return Err(ExecutorError::RateLimitExceeded {
                                    retry_after: RATE_LIMIT_STORE_FAILURE_RETRY_AFTER,
                                })
                            }
                        }
                    }

                    retry
                        .execute(&ctx, || {
                            let op_cell = op_cell.clone();
                            let circuit_breaker = circuit_breaker.clone();
                            async move {
                                circuit_breaker
                                    .execute(|| {
                                        let op_cell = op_cell.clone();
                                        async move {
                                            let fut = {
                                                let mut op = op_cell.lock().unwrap_or_else(|p| p.into_inner());
                                                op()
                                            };
                                            fut.await
                                        }
                                    })
                                    .await
                            }
                        })
                        .await
                }
            })
            .await;

        let elapsed = started.elapsed();
        match &result {
            Ok(_) => self.emit("request.completed", EventStatus::Success, Some(format!("{:?}", elapsed))),
            Err(e) => self.emit("request.failed", EventStatus::Failure, Some(e.to_string())),
        }

        result
    }
}

pub struct CompositeExecutorBuilder<E> {
    bulkhead: Option<BulkheadPolicy>,
    rate_limit: Option<(Arc<dyn RateLimitStrategy>, Arc<str>)>,
    retry: Option<RetryPolicy<E>>,
    circuit_breaker: Option<CircuitBreakerPolicy>,
    events: Option<EventBus>,
}

impl<E> CompositeExecutorBuilder<E>
where
    E: std::error::Error + Send + Sync + Clone + 'static,
{
    pub fn new() -> Self {
        Self { bulkhead: None, rate_limit: None, retry: None, circuit_breaker: None, events: None }
    }

    pub fn bulkhead(mut self, policy: BulkheadPolicy) -> Self {
        self.bulkhead = Some(policy);
        self
    }

    pub fn unlimited_bulkhead(mut self) -> Self {
        self.bulkhead = Some(BulkheadPolicy::unlimited());
        self
    }

    pub fn rate_limit(mut self, strategy: Arc<dyn RateLimitStrategy>, key: impl Into<Arc<str>>) -> Self {
        self.rate_limit = Some((strategy, key.into()));
        self
    }

    pub fn no_rate_limit(mut self) -> Self {
        self.rate_limit = None;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy<E>) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn circuit_breaker(mut self, policy: CircuitBreakerPolicy) -> Self {
        self.circuit_breaker = Some(policy);
        self
    }

    pub fn no_circuit_breaker(mut self) -> Self {
        self.circuit_breaker = Some(CircuitBreakerPolicy::with_config(CircuitBreakerConfig::disabled()));
        self
    }

    pub fn events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn build(self) -> CompositeExecutor<E> {
        CompositeExecutor {
            bulkhead: self.bulkhead.unwrap_or_else(|| BulkheadPolicy::new(100)),
            rate_limit: self.rate_limit,
            retry: self.retry.unwrap_or_else(|| RetryPolicy::builder().build()),
            circuit_breaker: self
                .circuit_breaker
                .unwrap_or_else(|| CircuitBreakerPolicy::with_config(CircuitBreakerConfig::disabled())),
            events: self.events,
        }
    }
}

impl<E> Default for CompositeExecutorBuilder<E>
where
    E: std::error::Error + Send + Sync + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
