use std::time::Duration;

use thiserror::Error;

/// An invalid [`Memoizer`](crate::Memoizer) configuration.
///
/// These are reported when building a memoizer, or when changing its refresh age later on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The refresh age is larger than the max age of the store.
    ///
    /// Entries would expire before they are ever considered stale, so a refresh would never be
    /// able to serve a stale value.
    #[error("refresh age {refresh_age:?} exceeds max age {max_age:?}")]
    RefreshAgeExceedsMaxAge {
        refresh_age: Duration,
        max_age: Duration,
    },
    /// A refresh age was configured, but the store does not track the age of its entries.
    #[error("refresh age requires a store with a max age")]
    RefreshAgeWithoutMaxAge,
    /// A max weight was configured without a weigher.
    #[error("max weight requires a weigher")]
    MissingWeigher,
    /// The store was configured to hold zero entries.
    #[error("max entries must be greater than zero")]
    ZeroCapacity,
    /// Capacity options were given alongside an externally supplied store.
    ///
    /// The capacity of a shared store is owned by whoever created it.
    #[error("capacity options cannot be combined with a shared store")]
    SharedStoreLimits,
    /// No scheduler was given and there is no tokio runtime to fall back to.
    #[error("no tokio runtime available to schedule computations")]
    NoRuntime,
}

/// The computation was dropped before it delivered a result.
///
/// This happens when the computation panics, or when the runtime it was spawned on is shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("computation was abandoned before delivering a result")]
pub struct Abandoned;
