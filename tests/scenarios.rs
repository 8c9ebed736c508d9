//! Integration tests for the six concrete scenarios spec'd end-to-end, each driving
//! a public API surface rather than a single module's internals.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use meshguard::{
    Authorizer, CircuitBreakerConfig, CircuitBreakerPolicy, CircuitState, Effect, ExecutorError,
    InMemoryTokenStore, Policy, RequestContext, Rotator, Token, TokenError, TokenFilter, TokenStore, TokenType,
    TokenBucketLimiter, RateLimitStrategy,
};
use meshguard::clock::FakeClock;
use meshguard::id::SequentialIdGen;
use meshguard::mesh::{Mesh, MeshError, Service, ServiceConfig};
use meshguard::sleeper::InstantSleeper;
use meshguard::context::Context;

#[derive(Debug, Clone, PartialEq, Eq)]
struct BreakerTestError;

impl std::fmt::Display for BreakerTestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "breaker test error")
    }
}
impl std::error::Error for BreakerTestError {}

#[tokio::test]
async fn breaker_trips_and_recovers() {
    let clock = FakeClock::new();
    let breaker = CircuitBreakerPolicy::with_config(CircuitBreakerConfig {
        failure_threshold: 3,
        recovery_timeout: Duration::from_secs(1),
        half_open_max_calls: 1,
    })
    .with_clock(clock.clone());

    for _ in 0..3 {
        let result = breaker.execute(|| async { Err::<(), _>(ExecutorError::Inner(BreakerTestError)) }).await;
        assert!(result.is_err());
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let result = breaker.execute(|| async { Ok::<_, ExecutorError<BreakerTestError>>(()) }).await;
    assert!(result.unwrap_err().is_circuit_open());

    clock.advance(1_000);

    let result = breaker.execute(|| async { Ok::<_, ExecutorError<BreakerTestError>>(()) }).await;
    assert!(result.is_ok());
    assert_eq!(breaker.state(), CircuitState::Closed);

    let result = breaker.execute(|| async { Ok::<_, ExecutorError<BreakerTestError>>(()) }).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn token_bucket_admits_then_denies_then_refills() {
    let clock = FakeClock::new();
    let limiter = TokenBucketLimiter::new(2.0, 1.0).with_clock(Arc::new(clock.clone()));

    assert!(limiter.allow("k", 1).await.unwrap().ok);
    assert!(limiter.allow("k", 1).await.unwrap().ok);

    let denied = limiter.allow("k", 1).await.unwrap();
    assert!(!denied.ok);
    assert!(denied.retry_after.is_some());

    clock.advance(1_000);
    assert!(limiter.allow("k", 1).await.unwrap().ok);
}

#[tokio::test]
async fn token_lifecycle_round_trips_through_save_list_revoke_cleanup() {
    let store = InMemoryTokenStore::new();
    let token = Token {
        id: "T".to_string(),
        value: "V".to_string(),
        token_type: TokenType::Access,
        subject: "S".to_string(),
        issuer: "issuer".to_string(),
        audience: vec![],
        scopes: vec![],
        issued_at_millis: 0,
        not_before_millis: 0,
        expires_at_millis: 60_000,
        algorithm: "none".to_string(),
        metadata: Default::default(),
        revocation: None,
    };
    store.save(token).await.unwrap();

    assert_eq!(store.get_by_value("V").await.unwrap().id, "T");
    let listed = store.list("S", &TokenFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);

    store.revoke("T", "rotated").await.unwrap();
    assert_eq!(store.get_by_id("T").await.unwrap_err(), TokenError::TokenRevoked);
    assert_eq!(store.list("S", &TokenFilter::default()).await.unwrap().len(), 0);
}

struct FlakyRevokeStore {
    inner: InMemoryTokenStore,
    fail_next_revoke: AtomicBool,
}

#[async_trait]
impl TokenStore for FlakyRevokeStore {
    async fn save(&self, token: Token) -> Result<(), TokenError> {
        self.inner.save(token).await
    }
    async fn get_by_id(&self, id: &str) -> Result<Token, TokenError> {
        self.inner.get_by_id(id).await
    }
    async fn get_by_value(&self, value: &str) -> Result<Token, TokenError> {
        self.inner.get_by_value(value).await
    }
    async fn delete(&self, id: &str) -> Result<(), TokenError> {
        self.inner.delete(id).await
    }
    async fn list(&self, subject: &str, filter: &TokenFilter) -> Result<Vec<Token>, TokenError> {
        self.inner.list(subject, filter).await
    }
    async fn revoke(&self, id: &str, reason: &str) -> Result<(), TokenError> {
        if self.fail_next_revoke.swap(false, Ordering::SeqCst) {
            return Err(TokenError::StoreFailed("induced failure".to_string()));
        }
        self.inner.revoke(id, reason).await
    }
    async fn is_revoked(&self, id: &str) -> Result<bool, TokenError> {
        self.inner.is_revoked(id).await
    }
    async fn cleanup(&self) -> Result<usize, TokenError> {
        self.inner.cleanup().await
    }
}

#[tokio::test]
async fn rotator_rotation_is_atomic_even_under_induced_store_failure() {
    let store = Arc::new(FlakyRevokeStore { inner: InMemoryTokenStore::new(), fail_next_revoke: AtomicBool::new(false) });
    let rotator = Rotator::new(store.clone(), Arc::new(SequentialIdGen::new("tok")), Arc::new(FakeClock::new()));

    store
        .save(Token {
            id: "T1".to_string(),
            value: "V1".to_string(),
            token_type: TokenType::Access,
            subject: "alice".to_string(),
            issuer: "issuer".to_string(),
            audience: vec![],
            scopes: vec![],
            issued_at_millis: 0,
            not_before_millis: 0,
            expires_at_millis: 60_000,
            algorithm: "none".to_string(),
            metadata: Default::default(),
            revocation: None,
        })
        .await
        .unwrap();

    let new_token = rotator.rotate("T1", Duration::from_secs(60)).await.unwrap();
    assert_ne!(new_token.id, "T1");
    assert!(store.is_revoked("T1").await.unwrap());
    assert!(store.get_by_id(&new_token.id).await.is_ok());

    store.fail_next_revoke.store(true, Ordering::SeqCst);
    let new_token_2 = rotator.rotate(&new_token.id, Duration::from_secs(60)).await.unwrap_err();
    let _ = new_token_2;
    assert!(!store.is_revoked(&new_token.id).await.unwrap());
}

#[tokio::test]
async fn authorizer_applies_deny_overrides() {
    let authz = Authorizer::new();
    authz.add_policy(
        Policy::new("allow-docs-read", Effect::Allow).with_subjects(&["*"]).with_resources(&["/docs/*"]).with_actions(&["read"]),
    );
    authz.add_policy(
        Policy::new("deny-alice-secret", Effect::Deny)
            .with_subjects(&["alice"])
            .with_resources(&["/docs/secret"])
            .with_actions(&["read"]),
    );

    let ctx = RequestContext::default();
    assert!(!authz.authorize("alice", "read", "/docs/secret", &ctx).allowed);
    assert!(authz.authorize("bob", "read", "/docs/public", &ctx).allowed);
}

#[tokio::test]
async fn dependency_failure_propagates_without_double_invoking_siblings() {
    let mesh = Mesh::new();
    let payment_calls = Arc::new(AtomicUsize::new(0));
    let inventory_calls = Arc::new(AtomicUsize::new(0));

    let leaf_config = || ServiceConfig {
        retry: meshguard::RetryPolicy::builder().max_attempts(1).unwrap().with_sleeper(InstantSleeper).build(),
        ..ServiceConfig::new(4)
    };

    mesh.add_service(Service::new("s1", "payment", "payment", "1.0", vec![], leaf_config(), None)).unwrap();
    mesh.add_service(Service::new("s2", "inventory", "inventory", "1.0", vec![], leaf_config(), None)).unwrap();
    mesh.add_service(Service::new(
        "s3",
        "order",
        "order",
        "1.0",
        vec!["payment".to_string(), "inventory".to_string()],
        leaf_config(),
        None,
    ))
    .unwrap();

    let result = mesh
        .process("order", &Context::background(), || {
            let payment_calls = payment_calls.clone();
            async move {
                payment_calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ExecutorError<MeshError>>(())
            }
        })
        .await;

    // Inventory dependency always succeeds here (no-op propagation); exercise the
    // failure path by overloading it so the dependency call itself fails.
    mesh.set_service_load("inventory", 1.0);
    let result2 = mesh
        .process("order", &Context::background(), || {
            let payment_calls = payment_calls.clone();
            async move {
                payment_calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ExecutorError<MeshError>>(())
            }
        })
        .await;

    assert!(result.is_ok());
    assert!(result2.is_err());
    assert_eq!(payment_calls.load(Ordering::SeqCst), 1);
    let _ = inventory_calls;
}
