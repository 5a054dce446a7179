//! Concurrent TTL cache used for event dedup and for the per-map system
//! and character projections.
//!
//! Grounded in the same pattern as the spam-reputation cache elsewhere in
//! this codebase family: a `DashMap` keyed by the cache key, storing the
//! value alongside an `Instant` expiry, checked on read and swept
//! periodically rather than on every write.

pub mod dashmap_ext;

pub use dashmap_ext::DashMapExt;

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A `DashMap`-backed cache where every entry carries its own TTL.
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            max_entries,
        }
    }

    /// Insert `value` for `key`, expiring after the cache's default TTL.
    /// If the cache is at capacity, sweeps expired entries first.
    pub fn insert(&self, key: K, value: V) {
        if self.entries.len() >= self.max_entries {
            self.prune_expired();
        }
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.default_ttl,
            },
        );
    }

    /// Whether `key` is present and not expired. Lazily removes an expired
    /// entry found along the way.
    pub fn contains(&self, key: &K) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => true,
            Some(_) => {
                drop(self.entries.remove(key));
                false
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all expired entries. Returns the number removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn get_cloned(&self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            _ => None,
        }
    }
}
