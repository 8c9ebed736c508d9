#![forbid(unsafe_code)]

//! # meshguard
//!
//! Core resilience and authorization runtime for a service-mesh / delegated-
//! authorization platform: a circuit breaker, rate limiters, a bulkhead, retry with
//! backoff, a deterministic composite executor, a typed event bus, a token lifecycle
//! engine (store, blacklist, rotation, validation), a service mesh runtime, and a
//! policy authorizer.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use meshguard::{Backoff, Context, ExecutorError, Jitter, RetryPolicy};
//!
//! #[derive(Debug, Clone, PartialEq, Eq)]
//! struct Flaky;
//!
//! impl std::fmt::Display for Flaky {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "flaky")
//!     }
//! }
//! impl std::error::Error for Flaky {}
//!
//! async fn flaky_operation(attempts: Arc<AtomicUsize>) -> Result<(), ExecutorError<Flaky>> {
//!     let n = attempts.fetch_add(1, Ordering::Relaxed);
//!     if n < 2 {
//!         Err(ExecutorError::Inner(Flaky))
//!     } else {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ExecutorError<Flaky>> {
//!     let attempts = Arc::new(AtomicUsize::new(0));
//!
//!     let retry = RetryPolicy::builder()
//!         .max_attempts(3)
//!         .expect("valid retry policy")
//!         .backoff(Backoff::exponential(Duration::from_millis(200)))
//!         .with_jitter(Jitter::full())
//!         .build();
//!
//!     retry.execute(&Context::background(), || flaky_operation(attempts.clone())).await?;
//!     Ok(())
//! }
//! ```

pub mod authz;
pub mod backoff;
pub mod bulkhead;
pub mod circuit_breaker;
pub mod clock;
pub mod context;
pub mod error;
pub mod events;
pub mod executor;
pub mod id;
pub mod jitter;
pub mod mesh;
pub mod prelude;
pub mod rate_limit;
pub mod retry;
pub mod sleeper;
pub mod tokens;

pub use authz::{Authorizer, Condition, Decision, Effect, Matcher, Policy, PolicyStatus, RequestContext};
pub use backoff::Backoff;
pub use bulkhead::BulkheadPolicy;
pub use circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy, CircuitState};
pub use clock::{Clock, FakeClock, MonotonicClock};
pub use context::{CancelHandle, Context, ExpiryKind};
pub use error::{ExecutorError, MAX_RETRY_FAILURES};
pub use executor::{CompositeExecutor, CompositeExecutorBuilder};
pub use id::{IdGen, SequentialIdGen, Uuid4IdGen};
pub use jitter::Jitter;
pub use mesh::{Mesh, MeshError, RegistrationError, Service, ServiceConfig};
pub use rate_limit::{
    AllowResult, DistributedLimiter, FixedWindowLimiter, InMemoryKv, KVStore, LeakyBucketLimiter, RateLimitError,
    RateLimitStrategy, SlidingWindowLimiter, StoreError, TokenBucketLimiter,
};
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use events::{Event, EventBus, EventHandler, EventStatus, EventType, Metadata, MetadataValue};
pub use tokens::{
    validate_token, Blacklist, InMemoryTokenStore, KvTokenStore, Rotator, Signer, Token, TokenError,
    TokenFilter, TokenStore, TokenType, ValidationConfig,
};
