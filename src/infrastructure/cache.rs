//! Decision cache backed by a sharded concurrent map.
//!
//! Memoizes the duplicate decision per exception occurrence, so that an event
//! rendered by several sinks is judged once. Entries are bounded both by count
//! and by age.

use crate::application::ports::{CacheLookup, Clock, DecisionStore};
use crate::domain::exception::OccurrenceId;
use crate::infrastructure::clock::SystemClock;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default maximum number of cached decisions.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default age after which a cached decision may be evicted.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct CachedDecision {
    value: bool,
    inserted: Instant,
}

/// Thread-safe decision cache backed by DashMap.
///
/// DashMap's entry API locks one shard while a missing value is computed,
/// which makes compute-if-absent atomic per key.
#[derive(Debug)]
pub struct DecisionCache {
    map: DashMap<OccurrenceId, CachedDecision>,
    max_entries: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl DecisionCache {
    /// Create a cache with the default bounds and the system clock.
    pub fn new() -> Self {
        Self::with_bounds(DEFAULT_MAX_ENTRIES, DEFAULT_TTL, Arc::new(SystemClock::new()))
    }

    /// Create a cache holding at most `max_entries` decisions.
    ///
    /// When full, decisions older than `ttl` are purged first, then the
    /// oldest remaining ones.
    pub fn with_bounds(max_entries: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            map: DashMap::new(),
            max_entries: max_entries.max(1),
            ttl,
            clock,
        }
    }

    /// Cached decision for `id`, if any.
    pub fn get(&self, id: OccurrenceId) -> Option<bool> {
        self.map.get(&id).map(|entry| entry.value)
    }

    fn make_room(&self, now: Instant) {
        let ttl = self.ttl;
        self.map
            .retain(|_, cached| now.saturating_duration_since(cached.inserted) < ttl);

        let excess = (self.map.len() + 1).saturating_sub(self.max_entries);
        if excess == 0 {
            return;
        }

        let mut by_age: Vec<(OccurrenceId, Instant)> = self
            .map
            .iter()
            .map(|entry| (*entry.key(), entry.value().inserted))
            .collect();
        by_age.sort_by_key(|(id, inserted)| (*inserted, *id));
        for (id, _) in by_age.into_iter().take(excess) {
            self.map.remove(&id);
        }
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionStore for DecisionCache {
    fn get_or_compute(&self, id: OccurrenceId, compute: &mut dyn FnMut() -> bool) -> CacheLookup {
        if let Some(value) = self.get(id) {
            return CacheLookup { value, hit: true };
        }

        let now = self.clock.now();
        // Evict before taking the entry: retain() needs every shard lock.
        if self.map.len() >= self.max_entries {
            self.make_room(now);
        }

        match self.map.entry(id) {
            Entry::Occupied(entry) => CacheLookup {
                value: entry.get().value,
                hit: true,
            },
            Entry::Vacant(entry) => {
                let value = compute();
                entry.insert(CachedDecision {
                    value,
                    inserted: now,
                });
                CacheLookup { value, hit: false }
            }
        }
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn clear(&self) {
        self.map.clear();
    }
}
