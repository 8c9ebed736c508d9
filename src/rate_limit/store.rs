//! `KVStore`: the backend contract for the distributed rate limiter and the
//! persisted token store. Follows the `rate_limit::store::TokenStore` CAS trait
//! shape, widened from a numeric-tokens-only contract to raw bytes with TTL so both
//! callers can use it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Backend for the distributed rate limiter and persisted token store. Must provide
/// atomic compare-and-swap and TTL expiry.
#[async_trait]
pub trait KVStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError>;
    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically replaces `key`'s value with `new` iff its current value equals
    /// `expected` (`None` means "key must be absent"). Returns `false` on mismatch.
    async fn cas(
        &self,
        key: &str,
        expected: Option<Vec<u8>>,
        new: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
}

struct Entry {
    value: Vec<u8>,
    expires_at_millis: Option<u64>,
}

/// In-process `KVStore` test double, for standalone use and deterministic tests.
#[derive(Default)]
pub struct InMemoryKv {
    data: Mutex<HashMap<String, Entry>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_millis() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }

    fn is_live(entry: &Entry, now: u64) -> bool {
        entry.expires_at_millis.map(|exp| exp > now).unwrap_or(true)
    }
}

#[async_trait]
impl KVStore for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Self::now_millis();
        let guard = self.data.lock().unwrap_or_else(|p| p.into_inner());
        Ok(guard.get(key).filter(|e| Self::is_live(e, now)).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at_millis = ttl.map(|t| Self::now_millis() + t.as_millis() as u64);
        let mut guard = self.data.lock().unwrap_or_else(|p| p.into_inner());
        guard.insert(key.to_string(), Entry { value, expires_at_millis });
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut guard = self.data.lock().unwrap_or_else(|p| p.into_inner());
        guard.remove(key);
        Ok(())
    }

    async fn cas(
        &self,
        key: &str,
        expected: Option<Vec<u8>>,
        new: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = Self::now_millis();
        let expires_at_millis = ttl.map(|t| now + t.as_millis() as u64);
        let mut guard = self.data.lock().unwrap_or_else(|p| p.into_inner());

        let current = guard.get(key).filter(|e| Self::is_live(e, now)).map(|e| e.value.clone());
        if current != expected {
            return Ok(false);
        }
        guard.insert(key.to_string(), Entry { value: new, expires_at_millis });
        Ok(true)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Self::now_millis();
        let guard = self.data.lock().unwrap_or_else(|p| p.into_inner());
        Ok(guard
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && Self::is_live(e, now))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut guard = self.data.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(entry) = guard.get_mut(key) {
            entry.expires_at_millis = Some(Self::now_millis() + ttl.as_millis() as u64);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let kv = InMemoryKv::new();
        kv.set("k", b"v".to_vec(), None).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn cas_rejects_on_mismatch() {
        let kv = InMemoryKv::new();
        kv.set("k", b"v1".to_vec(), None).await.unwrap();
        let ok = kv.cas("k", Some(b"wrong".to_vec()), b"v2".to_vec(), None).await.unwrap();
        assert!(!ok);
        assert_eq!(kv.get("k").await.unwrap(), Some(b"v1".to_vec()));
    }

    #[tokio::test]
    async fn cas_succeeds_on_match_and_on_absence() {
        let kv = InMemoryKv::new();
        assert!(kv.cas("k", None, b"v1".to_vec(), None).await.unwrap());
        assert!(kv.cas("k", Some(b"v1".to_vec()), b"v2".to_vec(), None).await.unwrap());
        assert_eq!(kv.get("k").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let kv = InMemoryKv::new();
        kv.set("k", b"v".to_vec(), Some(Duration::from_millis(0))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_returns_matching_keys() {
        let kv = InMemoryKv::new();
        kv.set("prefix:a", b"1".to_vec(), None).await.unwrap();
        kv.set("prefix:b", b"2".to_vec(), None).await.unwrap();
        kv.set("other:c", b"3".to_vec(), None).await.unwrap();
        let mut keys = kv.scan("prefix:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["prefix:a".to_string(), "prefix:b".to_string()]);
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let kv = InMemoryKv::new();
        kv.set("k", b"v".to_vec(), None).await.unwrap();
        kv.del("k").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), None);
    }
}
