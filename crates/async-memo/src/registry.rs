use std::collections::HashMap;

/// A completion handler waiting for the result of a running computation.
pub(crate) type Waiter<V> = Box<dyn FnOnce(V) + Send>;

/// The set of currently running computations, and who is waiting for them.
///
/// A key is present for exactly as long as a computation for it is running. Background refreshes
/// are registered with an empty queue, so that concurrent stale hits do not start another one,
/// while cache misses can still wait for the refreshed result.
pub(crate) struct InFlight<V> {
    pending: HashMap<String, Vec<Waiter<V>>>,
}

impl<V> InFlight<V> {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    /// Queues `waiter` onto the computation running for `key`.
    ///
    /// Gives the waiter back if nothing is running for `key`.
    pub fn join(&mut self, key: &str, waiter: Waiter<V>) -> Result<(), Waiter<V>> {
        match self.pending.get_mut(key) {
            Some(waiters) => {
                waiters.push(waiter);
                Ok(())
            }
            None => Err(waiter),
        }
    }

    /// Registers a new computation for `key`.
    pub fn begin(&mut self, key: String, waiters: Vec<Waiter<V>>) {
        debug_assert!(!self.pending.contains_key(&key));
        self.pending.insert(key, waiters);
    }

    /// Unregisters the computation for `key`, returning its waiters in the order they joined.
    pub fn finish(&mut self, key: &str) -> Vec<Waiter<V>> {
        self.pending.remove(key).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
