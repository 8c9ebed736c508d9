//! `TokenStore` (C8): save/get/delete/list/revoke/isRevoked/cleanup, grounded on the
//! teacher's `rate_limit::store::TokenStore` CAS-trait shape, generalized from a
//! numeric-bucket store to a full token record store.

use super::{now_millis, Blacklist, Revocation, Token, TokenError, TokenType};
use crate::rate_limit::KVStore;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;

/// Filter applied by [`TokenStore::list`].
#[derive(Debug, Clone, Default)]
pub struct TokenFilter {
    pub token_type: Option<TokenType>,
    pub scope: Option<String>,
    pub issued_after_millis: Option<u64>,
    pub issued_before_millis: Option<u64>,
    pub active_only: bool,
}

impl TokenFilter {
    fn matches(&self, token: &Token, now: u64) -> bool {
        if let Some(t) = self.token_type {
            if token.token_type != t {
                return false;
            }
        }
        if let Some(scope) = &self.scope {
            if !token.scopes.iter().any(|s| s == scope) {
                return false;
            }
        }
        if let Some(after) = self.issued_after_millis {
            if token.issued_at_millis < after {
                return false;
            }
        }
        if let Some(before) = self.issued_before_millis {
            if token.issued_at_millis > before {
                return false;
            }
        }
        if self.active_only && (token.is_revoked() || token.is_expired(now)) {
            return false;
        }
        true
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save(&self, token: Token) -> Result<(), TokenError>;
    async fn get_by_id(&self, id: &str) -> Result<Token, TokenError>;
    async fn get_by_value(&self, value: &str) -> Result<Token, TokenError>;
    async fn delete(&self, id: &str) -> Result<(), TokenError>;
    async fn list(&self, subject: &str, filter: &TokenFilter) -> Result<Vec<Token>, TokenError>;
    async fn revoke(&self, id: &str, reason: &str) -> Result<(), TokenError>;
    async fn is_revoked(&self, id: &str) -> Result<bool, TokenError>;
    async fn cleanup(&self) -> Result<usize, TokenError>;
}

/// In-process store: three `DashMap`s mirror the id→record, value→id, and
/// subject→active-ids indexes a listing query needs.
#[derive(Default)]
pub struct InMemoryTokenStore {
    by_id: DashMap<String, Token>,
    value_to_id: DashMap<String, String>,
    subject_index: DashMap<String, DashSet<String>>,
    blacklist: Blacklist,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_liveness(token: &Token) -> Result<(), TokenError> {
        if token.is_revoked() {
            return Err(TokenError::TokenRevoked);
        }
        if token.is_expired(now_millis()) {
            return Err(TokenError::TokenExpired);
        }
        Ok(())
    }

    /// The revocation blacklist this store feeds on every `revoke` call.
    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn save(&self, token: Token) -> Result<(), TokenError> {
        self.value_to_id.insert(token.value.clone(), token.id.clone());
        self.subject_index.entry(token.subject.clone()).or_default().insert(token.id.clone());
        self.by_id.insert(token.id.clone(), token);
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Token, TokenError> {
        let token = self.by_id.get(id).ok_or(TokenError::TokenNotFound)?.clone();
        Self::check_liveness(&token)?;
        Ok(token)
    }

    async fn get_by_value(&self, value: &str) -> Result<Token, TokenError> {
        let id = self.value_to_id.get(value).ok_or(TokenError::TokenNotFound)?.clone();
        self.get_by_id(&id).await
    }

    async fn delete(&self, id: &str) -> Result<(), TokenError> {
        if let Some((_, token)) = self.by_id.remove(id) {
            self.value_to_id.remove(&token.value);
            if let Some(ids) = self.subject_index.get(&token.subject) {
                ids.remove(id);
            }
        }
        Ok(())
    }

    async fn list(&self, subject: &str, filter: &TokenFilter) -> Result<Vec<Token>, TokenError> {
        let now = now_millis();
        let Some(ids) = self.subject_index.get(subject) else {
            return Ok(Vec::new());
        };
        let tokens = ids
            .iter()
            .filter_map(|id| self.by_id.get(id.key()).map(|t| t.clone()))
            .filter(|t| filter.matches(t, now))
            .collect();
        Ok(tokens)
    }

    async fn revoke(&self, id: &str, reason: &str) -> Result<(), TokenError> {
        let mut entry = self.by_id.get_mut(id).ok_or(TokenError::TokenNotFound)?;
        entry.revocation =
            Some(Revocation { revoked_at_millis: now_millis(), reason: reason.to_string(), revoked_by: None });
        self.blacklist.add(id, entry.expires_at_millis, reason);
        Ok(())
    }

    async fn is_revoked(&self, id: &str) -> Result<bool, TokenError> {
        let token = self.by_id.get(id).ok_or(TokenError::TokenNotFound)?;
        Ok(token.is_revoked() || self.blacklist.is_blacklisted(id))
    }

    async fn cleanup(&self) -> Result<usize, TokenError> {
        let now = now_millis();
        let expired: Vec<String> =
            self.by_id.iter().filter(|entry| entry.is_expired(now)).map(|entry| entry.id.clone()).collect();
        for id in &expired {
            self.delete(id).await?;
        }
        self.blacklist.cleanup();
        Ok(expired.len())
    }
}

fn grace_ttl(expires_at_millis: u64, now: u64, multiplier: f64) -> Duration {
    let base_millis = expires_at_millis.saturating_sub(now) as f64;
    Duration::from_millis((base_millis * multiplier.max(1.0)) as u64)
}

const FIELD_SEP: char = '\u{1}';
const LIST_SEP: char = '\u{2}';

fn token_type_tag(t: TokenType) -> &'static str {
    match t {
        TokenType::Access => "access",
        TokenType::Refresh => "refresh",
        TokenType::Id => "id",
        TokenType::Api => "api",
    }
}

fn parse_token_type(s: &str) -> Option<TokenType> {
    match s {
        "access" => Some(TokenType::Access),
        "refresh" => Some(TokenType::Refresh),
        "id" => Some(TokenType::Id),
        "api" => Some(TokenType::Api),
        _ => None,
    }
}

fn join_list(items: &[String]) -> String {
    items.join(&LIST_SEP.to_string())
}

fn split_list(s: &str) -> Vec<String> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split(LIST_SEP).map(|p| p.to_string()).collect()
    }
}

/// Manual delimited codec for [`Token`] records; the crate carries no serde
/// dependency, and the record shape is simple enough that hand-rolled encode/decode
/// is the idiomatic fit (same "no dependency unless the ecosystem reaches for one"
/// judgment applied to `Metadata` in `events::event`).
fn encode(token: &Token) -> Vec<u8> {
    let attrs = token
        .metadata
        .attributes
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>();
    let revocation = token
        .revocation
        .as_ref()
        .map(|r| format!("{}={}={}", r.revoked_at_millis, r.reason, r.revoked_by.clone().unwrap_or_default()))
        .unwrap_or_default();

    [
        token.id.clone(),
        token.value.clone(),
        token_type_tag(token.token_type).to_string(),
        token.subject.clone(),
        token.issuer.clone(),
        join_list(&token.audience),
        join_list(&token.scopes),
        token.issued_at_millis.to_string(),
        token.not_before_millis.to_string(),
        token.expires_at_millis.to_string(),
        token.algorithm.clone(),
        token.metadata.device.clone().unwrap_or_default(),
        token.metadata.app_id.clone().unwrap_or_default(),
        join_list(&token.metadata.labels),
        join_list(&token.metadata.tags),
        join_list(&attrs),
        revocation,
    ]
    .join(&FIELD_SEP.to_string())
    .into_bytes()
}

fn decode(bytes: &[u8]) -> Option<Token> {
    let s = std::str::from_utf8(bytes).ok()?;
    let parts: Vec<&str> = s.split(FIELD_SEP).collect();
    if parts.len() != 17 {
        return None;
    }

    let attributes = split_list(parts[15])
        .into_iter()
        .filter_map(|pair| pair.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
        .collect();

    let revocation = if parts[16].is_empty() {
        None
    } else {
        let mut fields = parts[16].splitn(3, '=');
        let revoked_at_millis = fields.next()?.parse().ok()?;
        let reason = fields.next()?.to_string();
        let revoked_by = fields.next().filter(|s| !s.is_empty()).map(|s| s.to_string());
        Some(Revocation { revoked_at_millis, reason, revoked_by })
    };

    Some(Token {
        id: parts[0].to_string(),
        value: parts[1].to_string(),
        token_type: parse_token_type(parts[2])?,
        subject: parts[3].to_string(),
        issuer: parts[4].to_string(),
        audience: split_list(parts[5]),
        scopes: split_list(parts[6]),
        issued_at_millis: parts[7].parse().ok()?,
        not_before_millis: parts[8].parse().ok()?,
        expires_at_millis: parts[9].parse().ok()?,
        algorithm: parts[10].to_string(),
        metadata: super::TokenMetadata {
            device: Some(parts[11]).filter(|s| !s.is_empty()).map(|s| s.to_string()),
            app_id: Some(parts[12]).filter(|s| !s.is_empty()).map(|s| s.to_string()),
            labels: split_list(parts[13]),
            tags: split_list(parts[14]),
            attributes,
        },
        revocation,
    })
}

/// Persisted-key-layout adapter over any [`KVStore`]: `<prefix>raw:<value>`,
/// `<prefix>id:<id>`, `<prefix>revoked:<value>`, `<prefix>subject:<subject>`.
pub struct KvTokenStore<K: KVStore> {
    store: Arc<K>,
    prefix: String,
    expiration_multiplier: f64,
    blacklist: Blacklist,
}

impl<K: KVStore> KvTokenStore<K> {
    pub fn new(store: Arc<K>, prefix: impl Into<String>) -> Self {
        Self { store, prefix: prefix.into(), expiration_multiplier: 1.0, blacklist: Blacklist::new() }
    }

    pub fn with_expiration_multiplier(mut self, multiplier: f64) -> Self {
        self.expiration_multiplier = multiplier;
        self
    }

    /// The revocation blacklist this store feeds on every `revoke` call.
    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    fn raw_key(&self, value: &str) -> String {
        format!("{}raw:{}", self.prefix, value)
    }

    fn id_key(&self, id: &str) -> String {
        format!("{}id:{}", self.prefix, id)
    }

    fn revoked_key(&self, value: &str) -> String {
        format!("{}revoked:{}", self.prefix, value)
    }

    fn subject_key(&self, subject: &str) -> String {
        format!("{}subject:{}", self.prefix, subject)
    }
}

#[async_trait]
impl<K: KVStore> TokenStore for KvTokenStore<K> {
    async fn save(&self, token: Token) -> Result<(), TokenError> {
        let now = now_millis();
        let ttl = grace_ttl(token.expires_at_millis, now, self.expiration_multiplier);

        self.store
            .set(&self.raw_key(&token.value), encode(&token), Some(ttl))
            .await
            .map_err(|e| TokenError::StoreFailed(e.to_string()))?;
        self.store
            .set(&self.id_key(&token.id), token.value.clone().into_bytes(), Some(ttl))
            .await
            .map_err(|e| TokenError::StoreFailed(e.to_string()))?;

        let subject_key = self.subject_key(&token.subject);
        let mut members = self
            .store
            .get(&subject_key)
            .await
            .map_err(|e| TokenError::StoreFailed(e.to_string()))?
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
            .unwrap_or_default();
        if !members.split(',').any(|v| v == token.value) {
            if !members.is_empty() {
                members.push(',');
            }
            members.push_str(&token.value);
        }
        self.store
            .set(&subject_key, members.into_bytes(), Some(ttl))
            .await
            .map_err(|e| TokenError::StoreFailed(e.to_string()))?;

        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Token, TokenError> {
        let value = self
            .store
            .get(&self.id_key(id))
            .await
            .map_err(|e| TokenError::StoreFailed(e.to_string()))?
            .ok_or(TokenError::TokenNotFound)?;
        self.get_by_value(&String::from_utf8_lossy(&value)).await
    }

    async fn get_by_value(&self, value: &str) -> Result<Token, TokenError> {
        let revoked = self
            .store
            .get(&self.revoked_key(value))
            .await
            .map_err(|e| TokenError::StoreFailed(e.to_string()))?;
        if revoked.is_some() {
            return Err(TokenError::TokenRevoked);
        }
        let raw = self
            .store
            .get(&self.raw_key(value))
            .await
            .map_err(|e| TokenError::StoreFailed(e.to_string()))?
            .ok_or(TokenError::TokenNotFound)?;
        let token = decode(&raw).ok_or_else(|| TokenError::InvalidMetadata("corrupt stored token record".to_string()))?;
        if token.is_expired(now_millis()) {
            return Err(TokenError::TokenExpired);
        }
        Ok(token)
    }

    async fn delete(&self, id: &str) -> Result<(), TokenError> {
        let value = self
            .store
            .get(&self.id_key(id))
            .await
            .map_err(|e| TokenError::StoreFailed(e.to_string()))?;
        self.store.del(&self.id_key(id)).await.map_err(|e| TokenError::StoreFailed(e.to_string()))?;

        let Some(value) = value else { return Ok(()) };
        let value = String::from_utf8_lossy(&value).to_string();

        let raw = self.store.get(&self.raw_key(&value)).await.map_err(|e| TokenError::StoreFailed(e.to_string()))?;
        if let Some(subject) = raw.as_deref().and_then(decode).map(|t| t.subject) {
            let subject_key = self.subject_key(&subject);
            if let Some(bytes) = self.store.get(&subject_key).await.map_err(|e| TokenError::StoreFailed(e.to_string()))? {
                let members = String::from_utf8_lossy(&bytes).to_string();
                let remaining = members.split(',').filter(|v| *v != value && !v.is_empty()).collect::<Vec<_>>().join(",");
                self.store
                    .set(&subject_key, remaining.into_bytes(), None)
                    .await
                    .map_err(|e| TokenError::StoreFailed(e.to_string()))?;
            }
        }

        self.store.del(&self.raw_key(&value)).await.map_err(|e| TokenError::StoreFailed(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, subject: &str, filter: &TokenFilter) -> Result<Vec<Token>, TokenError> {
        let now = now_millis();
        let members = self
            .store
            .get(&self.subject_key(subject))
            .await
            .map_err(|e| TokenError::StoreFailed(e.to_string()))?
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
            .unwrap_or_default();

        let mut tokens = Vec::new();
        for value in members.split(',').filter(|v| !v.is_empty()) {
            match self.get_by_value(value).await {
                Ok(token) if filter.matches(&token, now) => tokens.push(token),
                Ok(_) | Err(TokenError::TokenRevoked) | Err(TokenError::TokenExpired) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(tokens)
    }

    async fn revoke(&self, id: &str, reason: &str) -> Result<(), TokenError> {
        let value = self
            .store
            .get(&self.id_key(id))
            .await
            .map_err(|e| TokenError::StoreFailed(e.to_string()))?
            .ok_or(TokenError::TokenNotFound)?;
        let value = String::from_utf8_lossy(&value).to_string();
        self.store
            .set(&self.revoked_key(&value), reason.as_bytes().to_vec(), None)
            .await
            .map_err(|e| TokenError::StoreFailed(e.to_string()))?;

        let expires_at_millis = self
            .store
            .get(&self.raw_key(&value))
            .await
            .map_err(|e| TokenError::StoreFailed(e.to_string()))?
            .and_then(|raw| decode(&raw))
            .map(|t| t.expires_at_millis)
            .unwrap_or_else(now_millis);
        self.blacklist.add(id, expires_at_millis, reason);
        Ok(())
    }

    async fn is_revoked(&self, id: &str) -> Result<bool, TokenError> {
        if self.blacklist.is_blacklisted(id) {
            return Ok(true);
        }
        let value = self
            .store
            .get(&self.id_key(id))
            .await
            .map_err(|e| TokenError::StoreFailed(e.to_string()))?
            .ok_or(TokenError::TokenNotFound)?;
        let value = String::from_utf8_lossy(&value).to_string();
        Ok(self.store.get(&self.revoked_key(&value)).await.map_err(|e| TokenError::StoreFailed(e.to_string()))?.is_some())
    }

    /// Every token key this adapter writes carries its own TTL, so the backend
    /// expires those itself; the in-process blacklist has no TTL of its own and
    /// still needs its periodic sweep.
    async fn cleanup(&self) -> Result<usize, TokenError> {
        self.blacklist.cleanup();
        Ok(0)
    }
}
