// Per-pid working directory cache, evicted on expiry

use std::collections::HashMap;

use crate::domain::Pid;

struct CachedCwd {
    cwd: Option<String>,
    expires_at: i64,
}

/// Caches resolved cwds (including misses) for `ttl_ms`
pub struct CwdCache {
    ttl_ms: i64,
    entries: HashMap<Pid, CachedCwd>,
}

impl CwdCache {
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            ttl_ms,
            entries: HashMap::new(),
        }
    }

    /// Cached value if unexpired. The outer None means "resolve again".
    pub fn get(&self, pid: Pid, now: i64) -> Option<Option<String>> {
        self.entries
            .get(&pid)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.cwd.clone())
    }

    pub fn insert(&mut self, pid: Pid, cwd: Option<String>, now: i64) {
        self.entries.insert(
            pid,
            CachedCwd {
                cwd,
                expires_at: now.saturating_add(self.ttl_ms),
            },
        );
    }

    /// Drop expired entries; returns the number removed
    pub fn evict_expired(&mut self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
