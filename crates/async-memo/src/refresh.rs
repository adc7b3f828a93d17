use std::time::Duration;

use crate::store::Timing;

/// How a cache hit is served.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// The entry is served as is.
    Fresh,
    /// The entry is served, and a background refresh is started.
    Stale,
    /// The entry is served, and a background refresh is already running.
    Refreshing,
}

impl Freshness {
    /// Classifies a cache hit by its age.
    ///
    /// An entry is stale once its age reaches `refresh_age`. Entries whose age is not tracked by
    /// the store are never stale. Expired entries never get here, as the store treats them as
    /// absent.
    pub fn classify(age: Timing, refresh_age: Option<Duration>, refreshing: bool) -> Self {
        let is_stale = match (age, refresh_age) {
            (Timing::Known(age), Some(refresh_age)) => age >= refresh_age,
            _ => false,
        };

        match (is_stale, refreshing) {
            (false, _) => Freshness::Fresh,
            (true, false) => Freshness::Stale,
            (true, true) => Freshness::Refreshing,
        }
    }
}
