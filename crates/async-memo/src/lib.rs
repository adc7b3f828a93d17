//! # Asynchronous memoization with request coalescing
//!
//! This crate wraps an asynchronous [`Computation`] into a [`Memoizer`], which caches the results
//! of the computation keyed by its arguments. It is meant for slow or expensive lookups that are
//! requested over and over again, and often concurrently.
//!
//! ## How a call is served
//!
//! A call to [`Memoizer::invoke`] (or its future-based sibling [`Memoizer::call`]) goes through
//! the following steps:
//!
//! - The arguments are turned into a string key by the configured canonicalizer. A canonicalizer
//!   returning `None` bypasses memoization altogether, and the computation is run directly.
//! - The key is looked up in the [`CacheStore`]. A hit is served right away, unless it is older
//!   than the configured `refresh_age`, in which case a single background refresh is started in
//!   addition to serving the stale value.
//! - On a miss, the caller is queued onto an already running computation for the same key, if
//!   there is one. Otherwise a new computation is started.
//! - Once the computation finishes, its [`Outcome`] is written to the store and delivered to
//!   every queued caller.
//!
//! There is at most one running computation per key at any time, and all callers that were
//! coalesced onto it receive the very same [`Outcome`] (the same [`Arc`](std::sync::Arc)).
//!
//! ## Delivery is always asynchronous
//!
//! Completions are never invoked from within the call that requested them. They are handed to
//! the [`Scheduler`] and run on a later scheduling step, even for cache hits or computations that
//! complete synchronously. This makes it safe for a completion to call back into the same
//! memoizer.
//!
//! ## Errors
//!
//! By default, failed computations are not cached, and the next call for the same key will
//! recompute. With [`MemoizeConfig::cache_errors`] enabled, errors are stored and served like
//! any other result until they are evicted or purged.
//!
//! ## Sharing a store
//!
//! A single store can back multiple memoizers. Every memoizer prefixes its keys with its own
//! key prefix, which is either configured explicitly or allocated from [`KeyPrefixes`], so that
//! [`Memoizer::purge_all`] only removes the entries belonging to that memoizer.
//!
//! ### Metrics
//!
//! All metrics are tagged with a `memoizer` field that corresponds to the configured name:
//!
//! - `memoize.access`: All accesses.
//! - `memoize.hit`: Accesses served by the store.
//! - `memoize.coalesced`: Accesses that were queued onto a running computation.
//! - `memoize.bypass`: Accesses for which the canonicalizer disabled memoization.
//! - `memoize.computation`: Actual computations being run, tagged with `is_refresh`.
//! - `memoize.abandoned`: Computations that were dropped without producing a result.

#[macro_use]
pub mod metrics;

mod computation;
mod config;
mod error;
mod key;
mod memoizer;
mod refresh;
mod registry;
mod scheduler;
mod store;
mod utils;

pub use computation::{Computation, ContextFn, FnComputation, from_fn, with_context};
pub use config::MemoizeConfig;
pub use error::{Abandoned, ConfigError};
pub use key::{
    ArgumentList, Canonicalizer, KeyPrefixes, SEPARATOR, canonical_json, display_key,
};
pub use memoizer::{Memoizer, MemoizerBuilder, Outcome, ResultWeigher};
pub use refresh::Freshness;
pub use scheduler::{Scheduler, TokioScheduler};
pub use store::{CacheStore, LruStore, StoreLimits, Timing, Weigher};
