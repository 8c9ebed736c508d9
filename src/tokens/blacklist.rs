//! `Blacklist` (C9): a time-bounded revocation set, independent of any particular
//! `TokenStore` backend, with a periodic cleaner removing entries past `expires_at`.

use dashmap::DashMap;

use super::now_millis;

#[derive(Debug, Clone)]
pub struct BlacklistEntry {
    pub token_id: String,
    pub expires_at_millis: u64,
    pub revoked_at_millis: u64,
    pub reason: String,
}

#[derive(Default)]
pub struct Blacklist {
    entries: DashMap<String, BlacklistEntry>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, token_id: impl Into<String>, expires_at_millis: u64, reason: impl Into<String>) {
        let token_id = token_id.into();
        self.entries.insert(
            token_id.clone(),
            BlacklistEntry { token_id, expires_at_millis, revoked_at_millis: now_millis(), reason: reason.into() },
        );
    }

    pub fn is_blacklisted(&self, token_id: &str) -> bool {
        self.entries.get(token_id).is_some()
    }

    pub fn get(&self, token_id: &str) -> Option<BlacklistEntry> {
        self.entries.get(token_id).map(|e| e.clone())
    }

    /// Removes every entry whose `expires_at_millis` has passed. Safe to call
    /// concurrently with `add`/`is_blacklisted`.
    pub fn cleanup(&self) -> usize {
        let now = now_millis();
        let expired: Vec<String> =
            self.entries.iter().filter(|e| e.expires_at_millis < now).map(|e| e.key().clone()).collect();
        for id in &expired {
            self.entries.remove(id);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
