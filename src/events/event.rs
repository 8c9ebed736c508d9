//! The `Event` data model (C1) and its ordered, write-once `Metadata` map.

use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Auth,
    Authz,
    Token,
    Audit,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Success,
    Failure,
    Error,
    Denied,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Time(u64),
    StringList(Vec<String>),
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

#[derive(Debug, Clone)]
struct MetadataEntry {
    value: MetadataValue,
    read_only: bool,
}

/// An insertion-ordered string-keyed map where read-only entries can never be
/// overwritten or removed once set. No general-purpose ordered-map dependency is
/// pulled in for this; a `Vec` of pairs is the minimal idiomatic fit for the small
/// metadata bags events actually carry.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: Vec<(String, MetadataEntry)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Inserts or overwrites `key`. Returns `false` without modifying anything if
    /// `key` already holds a read-only entry.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> bool {
        self.insert_entry(key.into(), value.into(), false)
    }

    /// Inserts `key` as a permanently read-only entry. Returns `false` if `key`
    /// already holds a read-only entry (first-write-wins for read-only keys).
    pub fn insert_read_only(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> bool {
        self.insert_entry(key.into(), value.into(), true)
    }

    fn insert_entry(&mut self, key: String, value: MetadataValue, read_only: bool) -> bool {
        match self.position(&key) {
            Some(idx) => {
                if self.entries[idx].1.read_only {
                    return false;
                }
                self.entries[idx].1 = MetadataEntry { value, read_only };
                true
            }
            None => {
                self.entries.push((key, MetadataEntry { value, read_only }));
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.position(key).map(|idx| &self.entries[idx].1.value)
    }

    pub fn is_read_only(&self, key: &str) -> bool {
        self.position(key).map(|idx| self.entries[idx].1.read_only).unwrap_or(false)
    }

    /// Removes `key`. Returns `false` without modifying anything if the entry is
    /// read-only or absent.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.position(key) {
            Some(idx) if !self.entries[idx].1.read_only => {
                self.entries.remove(idx);
                true
            }
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), &v.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub id: String,
    pub event_type: EventType,
    pub action: String,
    pub status: EventStatus,
    pub timestamp_millis: u64,
    pub subject: Option<String>,
    pub resource: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub metadata: Metadata,
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

impl Event {
    pub fn new(id: impl Into<String>, event_type: EventType, action: impl Into<String>, status: EventStatus) -> Self {
        Self {
            id: id.into(),
            event_type,
            action: action.into(),
            status,
            timestamp_millis: now_millis(),
            subject: None,
            resource: None,
            message: None,
            error: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Convenience constructor for internally-generated `system` events (circuit
    /// breaker transitions, bus self-reports) that don't go through the application's
    /// own `IdGen`/`Clock`.
    pub fn system<I, K>(action: &str, metadata: I) -> Self
    where
        I: IntoIterator<Item = (K, String)>,
        K: Into<String>,
    {
        let mut meta = Metadata::new();
        for (k, v) in metadata {
            meta.insert(k.into(), v);
        }
        Self::new(uuid::Uuid::new_v4().to_string(), EventType::System, action, EventStatus::Success)
            .with_metadata(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_preserves_insertion_order() {
        let mut meta = Metadata::new();
        meta.insert("b", "2");
        meta.insert("a", "1");
        let keys: Vec<_> = meta.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn read_only_entries_cannot_be_overwritten_or_removed() {
        let mut meta = Metadata::new();
        assert!(meta.insert_read_only("k", "v1"));
        assert!(!meta.insert("k", "v2"));
        assert_eq!(meta.get("k"), Some(&MetadataValue::String("v1".to_string())));
        assert!(!meta.remove("k"));
    }

    #[test]
    fn mutable_entries_can_be_overwritten() {
        let mut meta = Metadata::new();
        meta.insert("k", "v1");
        assert!(meta.insert("k", "v2"));
        assert_eq!(meta.get("k"), Some(&MetadataValue::String("v2".to_string())));
        assert!(meta.remove("k"));
        assert!(meta.get("k").is_none());
    }

    #[test]
    fn system_event_carries_metadata() {
        let event = Event::system("circuit.opened", [("circuit", "payments".to_string())]);
        assert_eq!(event.event_type, EventType::System);
        assert_eq!(event.action, "circuit.opened");
        assert_eq!(event.metadata.get("circuit"), Some(&MetadataValue::String("payments".to_string())));
    }
}
