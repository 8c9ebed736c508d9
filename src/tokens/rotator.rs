//! `Rotator` (C9): issue-new-invalidate-old rotation with two-phase save and
//! compensation on failure, grounded on the optimistic-retry-then-compensate shape of
//! `rate_limit::strategies::TokenBucketLimiter`'s refill-then-commit loop — attempt,
//! detect failure, undo.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::id::IdGen;

use super::store::TokenStore;
use super::{Token, TokenError};

pub struct Rotator<S: TokenStore> {
    store: Arc<S>,
    id_gen: Arc<dyn IdGen>,
    clock: Arc<dyn Clock>,
}

impl<S: TokenStore> Rotator<S> {
    pub fn new(store: Arc<S>, id_gen: Arc<dyn IdGen>, clock: Arc<dyn Clock>) -> Self {
        Self { store, id_gen, clock }
    }

    /// Issues a new token inheriting `{type, subject, issuer, scopes, metadata}` from
    /// `old_id`, with a fresh id/value and a validity window of `validity` starting
    /// now, then revokes the old token. If revocation fails, the just-saved new token
    /// is deleted to restore the pre-rotation state — the caller never observes a
    /// state with both tokens live or both gone.
    pub async fn rotate(&self, old_id: &str, validity: Duration) -> Result<Token, TokenError> {
        let old = self.store.get_by_id(old_id).await?;

        let now = self.clock.now_unix_millis();
        let new_token = Token {
            id: self.id_gen.new_id(),
            value: self.id_gen.new_id(),
            token_type: old.token_type,
            subject: old.subject.clone(),
            issuer: old.issuer.clone(),
            audience: old.audience.clone(),
            scopes: old.scopes.clone(),
            issued_at_millis: now,
            not_before_millis: now,
            expires_at_millis: now + validity.as_millis() as u64,
            algorithm: old.algorithm.clone(),
            metadata: old.metadata.clone(),
            revocation: None,
        };

        self.store.save(new_token.clone()).await?;

        if let Err(e) = self.store.revoke(old_id, "rotated").await {
            let _ = self.store.delete(&new_token.id).await;
            return Err(e);
        }

        Ok(new_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::id::SequentialIdGen;
    use crate::tokens::store::InMemoryTokenStore;
    use crate::tokens::TokenMetadata;
    use crate::tokens::TokenType;

    fn sample_token(id: &str, value: &str) -> Token {
        Token {
            id: id.to_string(),
            value: value.to_string(),
            token_type: TokenType::Access,
            subject: "alice".to_string(),
            issuer: "issuer".to_string(),
            audience: vec!["aud".to_string()],
            scopes: vec!["read".to_string()],
            issued_at_millis: 0,
            not_before_millis: 0,
            expires_at_millis: 60_000,
            algorithm: "none".to_string(),
            metadata: TokenMetadata::default(),
            revocation: None,
        }
    }

    fn rotator() -> (Arc<InMemoryTokenStore>, Rotator<InMemoryTokenStore>) {
        let store = Arc::new(InMemoryTokenStore::new());
        let rotator =
            Rotator::new(store.clone(), Arc::new(SequentialIdGen::new("tok")), Arc::new(FakeClock::new()));
        (store, rotator)
    }

    #[tokio::test]
    async fn rotate_issues_new_token_and_revokes_old() {
        let (store, rotator) = rotator();
        store.save(sample_token("t1", "v1")).await.unwrap();

        let new_token = rotator.rotate("t1", Duration::from_secs(60)).await.unwrap();

        assert_ne!(new_token.id, "t1");
        assert_eq!(new_token.subject, "alice");
        assert_eq!(new_token.scopes, vec!["read".to_string()]);
        assert!(store.is_revoked("t1").await.unwrap());
        assert_eq!(store.get_by_id(&new_token.id).await.unwrap().subject, "alice");
    }

    #[tokio::test]
    async fn rotate_on_missing_token_returns_not_found() {
        let (_store, rotator) = rotator();
        let err = rotator.rotate("missing", Duration::from_secs(60)).await.unwrap_err();
        assert_eq!(err, TokenError::TokenNotFound);
    }

    #[tokio::test]
    async fn rotate_on_already_revoked_token_fails_without_issuing_new_one() {
        let (store, rotator) = rotator();
        store.save(sample_token("t1", "v1")).await.unwrap();
        store.revoke("t1", "first").await.unwrap();

        let err = rotator.rotate("t1", Duration::from_secs(60)).await.unwrap_err();
        assert_eq!(err, TokenError::TokenRevoked);
    }
}
