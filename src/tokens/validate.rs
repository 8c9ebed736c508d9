//! Validation chain: signature → validity window → issuer → audience → scopes →
//! revocation, as a straight-line function rather than a chain-of-responsibility
//! abstraction, following the explicit match-based control flow seen in
//! `circuit_breaker.rs`'s state machine and `retry.rs`'s attempt loop over trait
//! object chains.

use std::time::Duration;

use super::{Token, TokenError};

/// Abstract signing/verification capability. Actual cryptographic signing is an
/// external collaborator (non-goal of this crate); callers supply an implementation.
pub trait Signer: Send + Sync {
    fn sign(&self, bytes: &[u8]) -> Vec<u8>;
    fn verify(&self, bytes: &[u8], signature: &[u8]) -> bool;
}

/// Test/demo double that accepts every signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSigner;

impl Signer for NoopSigner {
    fn sign(&self, _bytes: &[u8]) -> Vec<u8> {
        Vec::new()
    }

    fn verify(&self, _bytes: &[u8], _signature: &[u8]) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationConfig {
    pub allowed_issuers: Vec<String>,
    pub allowed_audiences: Vec<String>,
    pub clock_skew: Duration,
    pub required_scopes: Vec<String>,
}

/// Validates `token` against `config`. `signature` and `signed_bytes` are passed
/// through to `signer` unchanged; an empty `signature` always fails signature check
/// unless the signer is a no-op double. Checks run in spec order; the first failure
/// stops evaluation.
pub fn validate_token(
    token: &Token,
    signed_bytes: &[u8],
    signature: &[u8],
    signer: &dyn Signer,
    config: &ValidationConfig,
    now_millis: u64,
) -> Result<(), TokenError> {
    if !signer.verify(signed_bytes, signature) {
        return Err(TokenError::InvalidSignature);
    }

    let skew = config.clock_skew.as_millis() as u64;
    if now_millis + skew < token.not_before_millis {
        return Err(TokenError::TokenNotYetValid);
    }
    if now_millis > token.expires_at_millis + skew {
        return Err(TokenError::TokenExpired);
    }

    if !config.allowed_issuers.is_empty() && !config.allowed_issuers.iter().any(|i| i == &token.issuer) {
        return Err(TokenError::InvalidIssuer);
    }

    if !config.allowed_audiences.is_empty()
        && !token.audience.iter().any(|aud| config.allowed_audiences.contains(aud))
    {
        return Err(TokenError::InvalidAudience);
    }

    if !config.required_scopes.iter().all(|s| token.scopes.contains(s)) {
        return Err(TokenError::InsufficientScope);
    }

    if token.is_revoked() {
        return Err(TokenError::TokenRevoked);
    }

    Ok(())
}
