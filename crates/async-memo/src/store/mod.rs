//! The key/value stores memoized results are kept in.

use std::time::Duration;

mod memory;

pub use self::memory::{LruStore, StoreLimits, Weigher};

/// How long an entry has been in the store, or how long it has left to live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timing {
    /// There is no entry for the key, or it has already expired.
    Absent,
    /// The entry exists, but its store does not track ages because it has no max age.
    Untracked,
    /// The entry exists, and this is the requested duration.
    Known(Duration),
}

impl Timing {
    /// Returns the duration if it is known.
    pub fn known(self) -> Option<Duration> {
        match self {
            Timing::Known(duration) => Some(duration),
            _ => None,
        }
    }

    /// Whether there is an entry at all.
    pub fn is_present(self) -> bool {
        !matches!(self, Timing::Absent)
    }
}

/// A store for memoized results.
///
/// A store may be shared by multiple [`Memoizer`](crate::Memoizer)s, each of which only touches the
/// keys under its own key prefix. Entries can disappear at any time, as the store is free to evict
/// them, and other users of a shared store may delete them.
pub trait CacheStore<V>: Send + Sync {
    /// Returns the entry for `key`, marking it as recently used.
    fn get(&self, key: &str) -> Option<V>;

    /// Returns the entry for `key` without affecting its recency.
    fn peek(&self, key: &str) -> Option<V>;

    /// Inserts or replaces the entry for `key`.
    fn set(&self, key: &str, value: V);

    /// Removes the entry for `key`.
    fn delete(&self, key: &str);

    /// Removes all entries.
    fn reset(&self);

    /// All keys currently in the store.
    fn keys(&self) -> Vec<String>;

    /// The time since the entry for `key` was inserted.
    fn age(&self, key: &str) -> Timing;

    /// The age at which entries are treated as absent, if any.
    fn max_age(&self) -> Option<Duration>;

    /// The number of entries.
    fn len(&self) -> usize;

    /// Whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The aggregated weight of all entries.
    fn weight(&self) -> u64;
}
