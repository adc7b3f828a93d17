use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use super::{CacheStore, Timing};

/// Computes the capacity cost of a value.
pub type Weigher<V> = Arc<dyn Fn(&V) -> u64 + Send + Sync>;

/// Limits of an [`LruStore`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreLimits {
    /// Maximum number of entries.
    pub max_entries: Option<usize>,
    /// Maximum aggregated weight of all entries.
    pub max_weight: Option<u64>,
    /// Age after which an entry is treated as absent.
    pub max_age: Option<Duration>,
}

struct Slot<V> {
    value: V,
    inserted: Instant,
    weight: u64,
}

struct Entries<V> {
    lru: LruCache<String, Slot<V>>,
    weight: u64,
}

/// An in-memory store that evicts the least recently used entries.
///
/// Eviction happens on insert, whenever either the number of entries or their aggregated weight
/// exceeds the configured [`StoreLimits`]. Entries older than `max_age` are treated as absent, and
/// are removed once they are accessed via [`get`](CacheStore::get).
pub struct LruStore<V> {
    entries: Mutex<Entries<V>>,
    limits: StoreLimits,
    weigher: Option<Weigher<V>>,
}

impl<V> fmt::Debug for LruStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (len, weight) = self
            .entries
            .try_lock()
            .map(|entries| (entries.lru.len(), entries.weight))
            .unwrap_or_default();
        f.debug_struct("LruStore")
            .field("limits", &self.limits)
            .field("entries", &len)
            .field("weight", &weight)
            .field("weigher", &self.weigher.is_some())
            .finish()
    }
}

impl<V> LruStore<V> {
    /// Creates a store with the given limits, weighing every entry as `1`.
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::unbounded(),
                weight: 0,
            }),
            limits,
            weigher: None,
        }
    }

    /// Creates a store without any limits.
    pub fn unbounded() -> Self {
        Self::new(StoreLimits::default())
    }

    /// Uses `weigher` to compute the weight of entries.
    pub fn with_weigher<F>(mut self, weigher: F) -> Self
    where
        F: Fn(&V) -> u64 + Send + Sync + 'static,
    {
        self.weigher = Some(Arc::new(weigher));
        self
    }

    /// The limits of this store.
    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    fn weigh(&self, value: &V) -> u64 {
        self.weigher.as_ref().map_or(1, |weigher| weigher(value))
    }

    fn is_expired(&self, slot: &Slot<V>) -> bool {
        self.limits
            .max_age
            .is_some_and(|max_age| slot.inserted.elapsed() >= max_age)
    }

    fn is_over_capacity(&self, entries: &Entries<V>) -> bool {
        let too_many = self
            .limits
            .max_entries
            .is_some_and(|max| entries.lru.len() > max);
        let too_heavy = self
            .limits
            .max_weight
            .is_some_and(|max| entries.weight > max);
        too_many || too_heavy
    }

    fn remove(entries: &mut Entries<V>, key: &str) {
        if let Some(slot) = entries.lru.pop(key) {
            entries.weight = entries.weight.saturating_sub(slot.weight);
        }
    }
}

impl<V> Default for LruStore<V> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<V> CacheStore<V> for LruStore<V>
where
    V: Clone + Send + Sync,
{
    fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        if self.is_expired(entries.lru.peek(key)?) {
            tracing::trace!(key, "Removing expired entry");
            Self::remove(&mut entries, key);
            return None;
        }
        entries.lru.get(key).map(|slot| slot.value.clone())
    }

    fn peek(&self, key: &str) -> Option<V> {
        let entries = self.entries.lock().unwrap();
        let slot = entries.lru.peek(key)?;
        if self.is_expired(slot) {
            return None;
        }
        Some(slot.value.clone())
    }

    fn set(&self, key: &str, value: V) {
        let weight = self.weigh(&value);
        let mut entries = self.entries.lock().unwrap();
        Self::remove(&mut entries, key);

        if self.limits.max_weight.is_some_and(|max| weight > max) {
            tracing::debug!(key, weight, "Entry exceeds the max weight, not storing it");
            return;
        }

        entries.weight = entries.weight.saturating_add(weight);
        let slot = Slot {
            value,
            inserted: Instant::now(),
            weight,
        };
        entries.lru.put(key.to_owned(), slot);

        while self.is_over_capacity(&entries) {
            let Some((evicted, slot)) = entries.lru.pop_lru() else {
                break;
            };
            entries.weight = entries.weight.saturating_sub(slot.weight);
            tracing::trace!(key = %evicted, "Evicted least recently used entry");
        }
    }

    fn delete(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap();
        Self::remove(&mut entries, key);
    }

    fn reset(&self) {
        let mut entries = self.entries.lock().unwrap();
        entries.lru.clear();
        entries.weight = 0;
    }

    fn keys(&self) -> Vec<String> {
        let entries = self.entries.lock().unwrap();
        entries.lru.iter().map(|(key, _)| key.clone()).collect()
    }

    fn age(&self, key: &str) -> Timing {
        let entries = self.entries.lock().unwrap();
        let Some(slot) = entries.lru.peek(key) else {
            return Timing::Absent;
        };
        if self.is_expired(slot) {
            return Timing::Absent;
        }
        match self.limits.max_age {
            // Ages are only meaningful for stores that expire their entries.
            None => Timing::Untracked,
            Some(_) => Timing::Known(slot.inserted.elapsed()),
        }
    }

    fn max_age(&self) -> Option<Duration> {
        self.limits.max_age
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap().lru.len()
    }

    fn weight(&self) -> u64 {
        self.entries.lock().unwrap().weight
    }
}
