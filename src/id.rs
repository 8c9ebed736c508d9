//! Identifier generation, injectable for deterministic tests (see [`crate::clock`] for
//! the same pattern applied to time).

use std::sync::atomic::{AtomicU64, Ordering};

/// Generates unique string identifiers for events, tokens, and subscriptions.
pub trait IdGen: Send + Sync + std::fmt::Debug {
    fn new_id(&self) -> String;
}

/// Production id generator backed by UUID v4.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uuid4IdGen;

impl IdGen for Uuid4IdGen {
    fn new_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic id generator for tests: `"{prefix}-{n}"` counting up from zero.
#[derive(Debug)]
pub struct SequentialIdGen {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), counter: AtomicU64::new(0) }
    }
}

impl IdGen for SequentialIdGen {
    fn new_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_id_gen_counts_up() {
        let gen = SequentialIdGen::new("tok");
        assert_eq!(gen.new_id(), "tok-0");
        assert_eq!(gen.new_id(), "tok-1");
    }

    #[test]
    fn uuid4_id_gen_produces_unique_ids() {
        let gen = Uuid4IdGen;
        let a = gen.new_id();
        let b = gen.new_id();
        assert_ne!(a, b);
    }
}
