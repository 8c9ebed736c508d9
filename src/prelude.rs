//! Convenient re-exports for common meshguard types.
pub use crate::{
    authz::{Authorizer, Condition, Decision, Effect, Matcher, Policy, PolicyStatus, RequestContext},
    backoff::Backoff,
    bulkhead::BulkheadPolicy,
    circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy, CircuitState},
    clock::{Clock, FakeClock, MonotonicClock},
    context::{CancelHandle, Context, ExpiryKind},
    error::ExecutorError,
    events::{Event, EventBus, EventHandler, EventStatus, EventType, Metadata, MetadataValue},
    executor::{CompositeExecutor, CompositeExecutorBuilder},
    id::{IdGen, SequentialIdGen, Uuid4IdGen},
    jitter::Jitter,
    mesh::{Mesh, MeshError, RegistrationError, Service, ServiceConfig},
    rate_limit::{
        AllowResult, DistributedLimiter, FixedWindowLimiter, KVStore, LeakyBucketLimiter, RateLimitError,
        RateLimitStrategy, SlidingWindowLimiter, TokenBucketLimiter,
    },
    retry::{BuildError, RetryPolicy, RetryPolicyBuilder},
    sleeper::{InstantSleeper, Sleeper, TokioSleeper},
    tokens::{
        validate_token, Blacklist, InMemoryTokenStore, KvTokenStore, Rotator, Signer, Token, TokenError,
        TokenFilter, TokenStore, TokenType, ValidationConfig,
    },
};
