use std::time::{Duration, Instant};

use dashmap::DashMap;

pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Pending state nonces issued at login and awaiting their callback.
pub trait StateStore: Send + Sync {
    fn insert(&self, nonce: &str);

    /// Removes `nonce` and reports whether it was pending. A nonce validates
    /// at most once.
    fn consume(&self, nonce: &str) -> bool;

    fn pending(&self) -> usize;
}

/// Process-local store. Entries older than the TTL never validate and are
/// swept whenever a new nonce is inserted.
#[derive(Debug)]
pub struct MemoryStateStore {
    pending: DashMap<String, Instant>,
    ttl: Duration,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_STATE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            ttl,
        }
    }

    fn sweep(&self) {
        let ttl = self.ttl;
        self.pending.retain(|_, issued| issued.elapsed() < ttl);
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStateStore {
    fn insert(&self, nonce: &str) {
        self.sweep();
        self.pending.insert(nonce.to_string(), Instant::now());
    }

    fn consume(&self, nonce: &str) -> bool {
        match self.pending.remove(nonce) {
            Some((_, issued)) => issued.elapsed() < self.ttl,
            None => false,
        }
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }
}
