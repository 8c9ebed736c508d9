//! Per-service wrapper: one [`CompositeExecutor`] per service, wired from the
//! service's resilience config, plus a lock-free [`Health`] snapshot and a load
//! factor that gates bulkhead admission.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::bulkhead::BulkheadPolicy;
use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy};
use crate::context::Context;
use crate::error::ExecutorError;
use crate::events::EventBus;
use crate::executor::CompositeExecutor;
use crate::rate_limit::RateLimitStrategy;
use crate::retry::RetryPolicy;

use super::health::{Health, HealthSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshError(pub String);

impl std::fmt::Display for MeshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MeshError {}

#[derive(Clone)]
pub struct ServiceConfig {
    pub max_concurrency: usize,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy<MeshError>,
    pub rate_limit: Option<(Arc<dyn RateLimitStrategy>, String)>,
}

impl ServiceConfig {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            circuit_breaker: CircuitBreakerConfig::disabled(),
            retry: RetryPolicy::builder().build(),
            rate_limit: None,
        }
    }
}

pub struct Service {
    pub id: String,
    pub service_type: String,
    pub name: String,
    pub version: String,
    pub dependencies: Vec<String>,
    executor: CompositeExecutor<MeshError>,
    load_factor: Arc<AtomicU64>,
    health: Health,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id)
            .field("service_type", &self.service_type)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl Service {
    pub fn new(
        id: impl Into<String>,
        service_type: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        dependencies: Vec<String>,
        config: ServiceConfig,
        events: Option<EventBus>,
    ) -> Self {
        let load_factor = Arc::new(AtomicU64::new(0));
        let gate_load_factor = load_factor.clone();
        let bulkhead = BulkheadPolicy::new(config.max_concurrency)
            .with_admission_gate(move || f64::from_bits(gate_load_factor.load(Ordering::Relaxed)) >= 1.0);

        let mut builder = CompositeExecutor::builder()
            .bulkhead(bulkhead)
            .circuit_breaker(CircuitBreakerPolicy::with_config(config.circuit_breaker))
            .retry(config.retry);
        builder = match config.rate_limit {
            Some((strategy, key)) => builder.rate_limit(strategy, key),
            None => builder.no_rate_limit(),
        };
        if let Some(bus) = events {
            builder = builder.events(bus);
        }

        Self {
            id: id.into(),
            service_type: service_type.into(),
            name: name.into(),
            version: version.into(),
            dependencies,
            executor: builder.build(),
            load_factor,
            health: Health::new(),
        }
    }

    pub fn set_load_factor(&self, factor: f64) {
        self.load_factor.store(factor.to_bits(), Ordering::Relaxed);
    }

    pub fn load_factor(&self) -> f64 {
        f64::from_bits(self.load_factor.load(Ordering::Relaxed))
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    /// Runs `operation` through this service's executor. `load_factor` feeds the
    /// bulkhead's admission gate: a factor `>= 1.0` makes the bulkhead refuse entry
    /// the same way a saturated semaphore would, simulating an overloaded downstream
    /// before retry or the circuit breaker ever see the call.
    pub async fn process<T, Fut, Op>(&self, ctx: &Context, operation: Op) -> Result<T, ExecutorError<MeshError>>
    where
        T: Send,
        Fut: Future<Output = Result<T, ExecutorError<MeshError>>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        let started = Instant::now();
        let result = self.executor.execute(ctx, operation).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(_) => self.health.record_success(elapsed),
            Err(_) => self.health.record_failure(elapsed, now_unix_millis()),
        }

        result
    }
}

fn now_unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
