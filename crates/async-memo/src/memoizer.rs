use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::computation::Computation;
use crate::config::{MemoizeConfig, validate_refresh_age};
use crate::error::{Abandoned, ConfigError};
use crate::key::{ArgumentList, Canonicalizer, KeyPrefixes, display_key};
use crate::refresh::Freshness;
use crate::registry::{InFlight, Waiter};
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::store::{CacheStore, LruStore, Timing};
use crate::utils::defer::defer;

/// The result of a computation, shared between everyone who asked for it.
pub type Outcome<T, E> = Arc<Result<T, E>>;

/// Computes the capacity cost of a result.
pub type ResultWeigher<T, E> = Arc<dyn Fn(&Result<T, E>) -> u64 + Send + Sync>;

type OutcomeOf<C> = Outcome<<C as Computation>::Output, <C as Computation>::Error>;
type StoreOf<C> = Arc<dyn CacheStore<OutcomeOf<C>>>;

/// Memoizes an asynchronous [`Computation`].
///
/// See the [crate docs](crate) for how calls are served. Cloning a memoizer is cheap, and all
/// clones share the same store and running computations.
pub struct Memoizer<C: Computation> {
    inner: Arc<Shared<C>>,
}

struct Shared<C: Computation> {
    name: String,
    computation: C,
    canonicalizer: Canonicalizer<C::Args>,
    store: StoreOf<C>,
    scheduler: Arc<dyn Scheduler>,
    key_prefix: String,
    cache_errors: bool,
    /// Guards the decision whether to serve, join or start a computation.
    state: Mutex<State<OutcomeOf<C>>>,
}

struct State<V> {
    in_flight: InFlight<V>,
    refresh_age: Option<Duration>,
}

impl<C: Computation> Clone for Memoizer<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Computation> fmt::Debug for Memoizer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (in_flight, refresh_age) = self
            .inner
            .state
            .try_lock()
            .map(|state| (state.in_flight.len(), state.refresh_age))
            .unwrap_or_default();
        f.debug_struct("Memoizer")
            .field("name", &self.inner.name)
            .field("key_prefix", &self.inner.key_prefix)
            .field("entries", &self.inner.store.len())
            .field("running computations", &in_flight)
            .field("refresh_age", &refresh_age)
            .field("cache_errors", &self.inner.cache_errors)
            .finish()
    }
}

impl<C: Computation> Memoizer<C>
where
    C::Args: ArgumentList,
{
    /// Starts building a memoizer that uses the default [`display_key`] canonicalizer.
    pub fn builder(computation: C) -> MemoizerBuilder<C> {
        MemoizerBuilder::with_canonicalizer(computation, display_key::<C::Args>)
    }
}

impl<C: Computation> Memoizer<C> {
    /// Calls the memoized computation.
    ///
    /// `completion` receives the outcome on a later scheduling step, never from within this call.
    /// It is dropped without being called if the computation is abandoned.
    pub fn invoke<F>(&self, args: C::Args, completion: F)
    where
        F: FnOnce(OutcomeOf<C>) + Send + 'static,
    {
        let shared = &self.inner;
        let name = shared.name.as_str();
        metric!(counter("memoize.access") += 1, "memoizer" => name);

        let Some(key) = shared.cache_key(&args) else {
            metric!(counter("memoize.bypass") += 1, "memoizer" => name);
            tracing::trace!(memoizer = name, "Bypassing memoization");
            self.spawn_bypass(args, Box::new(completion));
            return;
        };

        let mut state = shared.state.lock().unwrap();

        if let Some(outcome) = shared.store.get(&key) {
            metric!(counter("memoize.hit") += 1, "memoizer" => name);
            let freshness = Freshness::classify(
                shared.store.age(&key),
                state.refresh_age,
                state.in_flight.contains(&key),
            );
            tracing::trace!(memoizer = name, %key, ?freshness, "Serving memoized result");

            let refresh = freshness == Freshness::Stale;
            if refresh {
                state.in_flight.begin(key.clone(), Vec::new());
            }
            drop(state);

            shared
                .scheduler
                .defer(Box::new(move || completion(outcome)));
            if refresh {
                self.spawn_computation(key, args, true);
            }
            return;
        }

        let joined = state.in_flight.join(&key, Box::new(completion));
        match joined {
            Ok(()) => {
                metric!(counter("memoize.coalesced") += 1, "memoizer" => name);
                tracing::trace!(memoizer = name, %key, "Waiting for running computation");
            }
            Err(waiter) => {
                state.in_flight.begin(key.clone(), vec![waiter]);
                drop(state);
                self.spawn_computation(key, args, false);
            }
        }
    }

    /// Calls the memoized computation and waits for its outcome.
    pub async fn call(&self, args: C::Args) -> Result<OutcomeOf<C>, Abandoned> {
        let (sender, receiver) = oneshot::channel();
        self.invoke(args, move |outcome| {
            // the caller might not be interested anymore
            let _ = sender.send(outcome);
        });
        receiver.await.map_err(|_| Abandoned)
    }

    /// Returns the stored outcome for `args`, without refreshing it or marking it as used.
    pub fn peek(&self, args: &C::Args) -> Option<OutcomeOf<C>> {
        let key = self.inner.cache_key(args)?;
        self.inner.store.peek(&key)
    }

    /// Removes the stored outcome for `args`.
    pub fn purge(&self, args: &C::Args) {
        if let Some(key) = self.inner.cache_key(args) {
            self.inner.store.delete(&key);
        }
    }

    /// Removes all stored outcomes of this memoizer.
    ///
    /// Entries of a shared store that belong to someone else are left untouched.
    pub fn purge_all(&self) {
        let prefix = self.inner.key_prefix.as_str();
        let mut purged = 0;
        for key in self.inner.store.keys() {
            if key.starts_with(prefix) {
                self.inner.store.delete(&key);
                purged += 1;
            }
        }
        tracing::debug!(memoizer = %self.inner.name, purged, "Purged all entries");
    }

    /// The time since the outcome for `args` was stored.
    pub fn get_age(&self, args: &C::Args) -> Timing {
        match self.inner.cache_key(args) {
            Some(key) => self.inner.store.age(&key),
            None => Timing::Absent,
        }
    }

    /// The time until the outcome for `args` expires.
    pub fn get_ttl(&self, args: &C::Args) -> Timing {
        match (self.get_age(args), self.inner.store.max_age()) {
            (Timing::Known(age), Some(max_age)) => match max_age.checked_sub(age) {
                Some(ttl) if !ttl.is_zero() => Timing::Known(ttl),
                _ => Timing::Absent,
            },
            (Timing::Known(_), None) => Timing::Untracked,
            (timing, _) => timing,
        }
    }

    /// The age after which stored outcomes are refreshed in the background.
    pub fn refresh_age(&self) -> Option<Duration> {
        self.inner.state.lock().unwrap().refresh_age
    }

    /// Changes the refresh age, effective for the next call.
    pub fn set_refresh_age(&self, refresh_age: Option<Duration>) -> Result<(), ConfigError> {
        if let Some(refresh_age) = refresh_age {
            validate_refresh_age(refresh_age, self.inner.store.max_age())?;
        }
        self.inner.state.lock().unwrap().refresh_age = refresh_age;
        Ok(())
    }

    /// The full store key for `args`, or `None` if memoization is bypassed for them.
    pub fn cache_key(&self, args: &C::Args) -> Option<String> {
        self.inner.cache_key(args)
    }

    /// The prefix of all keys of this memoizer.
    pub fn key_prefix(&self) -> &str {
        &self.inner.key_prefix
    }

    /// The name used in logs and metrics.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The store the outcomes are kept in.
    pub fn store(&self) -> &StoreOf<C> {
        &self.inner.store
    }

    /// The computation this memoizer wraps.
    pub fn computation(&self) -> &C {
        &self.inner.computation
    }

    /// Whether a computation is currently running for `args`.
    pub fn is_computing(&self, args: &C::Args) -> bool {
        match self.inner.cache_key(args) {
            Some(key) => self.inner.state.lock().unwrap().in_flight.contains(&key),
            None => false,
        }
    }

    /// Runs the computation without memoizing it.
    fn spawn_bypass(&self, args: C::Args, completion: Waiter<OutcomeOf<C>>) {
        let computation = self.inner.computation.compute(args);
        let scheduler = Arc::clone(&self.inner.scheduler);
        self.inner.scheduler.spawn(Box::pin(async move {
            let outcome = Arc::new(computation.await);
            scheduler.defer(Box::new(move || completion(outcome)));
        }));
    }

    /// Starts the computation for `key`, which has to be registered as in flight already.
    fn spawn_computation(&self, key: String, args: C::Args, is_refresh: bool) {
        let name = self.inner.name.as_str();
        metric!(
            counter("memoize.computation") += 1,
            "memoizer" => name,
            "is_refresh" => if is_refresh { "true" } else { "false" },
        );
        if is_refresh {
            tracing::debug!(memoizer = name, %key, "Spawning background refresh");
        } else {
            tracing::trace!(memoizer = name, %key, "Spawning computation");
        }

        // Unregisters the computation in case it panics, or its task is dropped before it
        // completes. This has to be armed before the computation is started.
        let abandoned = {
            let shared = Arc::clone(&self.inner);
            let key = key.clone();
            defer(move || shared.abandon(&key))
        };

        let computation = self.inner.computation.compute(args);

        let shared = Arc::clone(&self.inner);
        self.inner.scheduler.spawn(Box::pin(async move {
            let started = Instant::now();
            let outcome = Arc::new(computation.await);

            metric!(
                timer("memoize.computation.duration") = started.elapsed().as_millis() as u64,
                "memoizer" => shared.name.as_str(),
            );
            shared.complete(key, outcome);
            abandoned.disarm();
        }));
    }
}

impl<C: Computation> Shared<C> {
    fn cache_key(&self, args: &C::Args) -> Option<String> {
        let key = (self.canonicalizer)(args)?;
        Some(format!("{}{}", self.key_prefix, key))
    }

    /// Stores the outcome of a finished computation and hands it to everyone waiting for it.
    fn complete(&self, key: String, outcome: OutcomeOf<C>) {
        // The store runs the weigher, which must not be called with `state` locked. Until the key
        // is unregistered below, new callers either hit the store or join the waiters.
        if outcome.is_ok() || self.cache_errors {
            self.store.set(&key, Arc::clone(&outcome));
        } else {
            tracing::debug!(memoizer = %self.name, %key, "Not memoizing failed computation");
        }
        let waiters = self.state.lock().unwrap().in_flight.finish(&key);

        if waiters.is_empty() {
            return;
        }
        // A computation may have completed synchronously, so this is always deferred.
        self.scheduler.defer(Box::new(move || {
            for waiter in waiters {
                waiter(Arc::clone(&outcome));
            }
        }));
    }

    fn abandon(&self, key: &str) {
        metric!(counter("memoize.abandoned") += 1, "memoizer" => self.name.as_str());
        let waiters = self.state.lock().unwrap().in_flight.finish(key);
        tracing::error!(
            memoizer = %self.name,
            key,
            waiters = waiters.len(),
            "Computation was abandoned before it completed"
        );
    }
}

/// Builds a [`Memoizer`].
pub struct MemoizerBuilder<C: Computation> {
    computation: C,
    canonicalizer: Canonicalizer<C::Args>,
    config: MemoizeConfig,
    weigher: Option<ResultWeigher<C::Output, C::Error>>,
    store: Option<StoreOf<C>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl<C: Computation> MemoizerBuilder<C> {
    /// Starts building a memoizer that turns arguments into keys using `canonicalizer`.
    ///
    /// The canonicalizer may return `None` to bypass memoization for a call.
    pub fn with_canonicalizer<F>(computation: C, canonicalizer: F) -> Self
    where
        F: Fn(&C::Args) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            computation,
            canonicalizer: Arc::new(canonicalizer),
            config: MemoizeConfig::default(),
            weigher: None,
            store: None,
            scheduler: None,
        }
    }

    /// Replaces the canonicalizer.
    pub fn canonicalizer<F>(mut self, canonicalizer: F) -> Self
    where
        F: Fn(&C::Args) -> Option<String> + Send + Sync + 'static,
    {
        self.canonicalizer = Arc::new(canonicalizer);
        self
    }

    /// Uses `config` for all plain options.
    pub fn config(mut self, config: MemoizeConfig) -> Self {
        self.config = config;
        self
    }

    /// Limits the number of stored outcomes.
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.config.max_entries = Some(max_entries);
        self
    }

    /// Limits the aggregated weight of stored outcomes, as computed by `weigher`.
    pub fn max_weight<F>(mut self, max_weight: u64, weigher: F) -> Self
    where
        F: Fn(&Result<C::Output, C::Error>) -> u64 + Send + Sync + 'static,
    {
        self.config.max_weight = Some(max_weight);
        self.weigher(weigher)
    }

    /// Computes the weight of stored outcomes with `weigher`.
    ///
    /// Without a max weight, the weight is only tracked, see [`CacheStore::weight`].
    pub fn weigher<F>(mut self, weigher: F) -> Self
    where
        F: Fn(&Result<C::Output, C::Error>) -> u64 + Send + Sync + 'static,
    {
        self.weigher = Some(Arc::new(weigher));
        self
    }

    /// Expires stored outcomes after `max_age`.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.config.max_age = Some(max_age);
        self
    }

    /// Serves outcomes older than `refresh_age` while refreshing them in the background.
    pub fn refresh_age(mut self, refresh_age: Duration) -> Self {
        self.config.refresh_age = Some(refresh_age);
        self
    }

    /// Stores failed outcomes like successful ones.
    pub fn cache_errors(mut self, cache_errors: bool) -> Self {
        self.config.cache_errors = cache_errors;
        self
    }

    /// Names this memoizer in logs and metrics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Prefixes all keys with `key_prefix`.
    pub fn key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.config.key_prefix = Some(key_prefix.into());
        self
    }

    /// Allocates the key prefix from `prefixes` instead of the global registry.
    pub fn key_prefixes(self, prefixes: &KeyPrefixes) -> Self {
        self.key_prefix(prefixes.next_prefix())
    }

    /// Keeps the outcomes in `store`, which may be shared with other memoizers.
    ///
    /// The capacity of the store is owned by whoever created it, so this cannot be combined with
    /// any of the capacity options.
    pub fn store(mut self, store: StoreOf<C>) -> Self {
        self.store = Some(store);
        self
    }

    /// Runs computations and delivers outcomes with `scheduler`.
    ///
    /// Defaults to a [`TokioScheduler`] for the current runtime.
    pub fn scheduler(mut self, scheduler: impl Scheduler) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Validates the configuration and builds the memoizer.
    pub fn build(self) -> Result<Memoizer<C>, ConfigError> {
        let Self {
            computation,
            canonicalizer,
            config,
            weigher,
            store,
            scheduler,
        } = self;
        config.validate()?;

        let store = match store {
            Some(store) => {
                if config.has_store_limits() || weigher.is_some() {
                    return Err(ConfigError::SharedStoreLimits);
                }
                store
            }
            None => {
                if config.max_weight.is_some() && weigher.is_none() {
                    return Err(ConfigError::MissingWeigher);
                }
                let mut store = LruStore::new(config.store_limits());
                if let Some(weigher) = weigher {
                    store = store.with_weigher(move |outcome: &OutcomeOf<C>| weigher(&**outcome));
                }
                Arc::new(store)
            }
        };

        if let Some(refresh_age) = config.refresh_age {
            validate_refresh_age(refresh_age, store.max_age())?;
        }

        let scheduler = match scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(TokioScheduler::current()?),
        };

        let key_prefix = config
            .key_prefix
            .clone()
            .unwrap_or_else(|| KeyPrefixes::global().next_prefix());

        let shared = Shared {
            name: config.name().to_owned(),
            computation,
            canonicalizer,
            store,
            scheduler,
            key_prefix,
            cache_errors: config.cache_errors,
            state: Mutex::new(State {
                in_flight: InFlight::new(),
                refresh_age: config.refresh_age,
            }),
        };
        tracing::debug!(
            memoizer = %shared.name,
            key_prefix = ?shared.key_prefix,
            "Created memoizer"
        );

        Ok(Memoizer {
            inner: Arc::new(shared),
        })
    }
}
