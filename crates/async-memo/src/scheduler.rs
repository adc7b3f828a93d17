use std::fmt;

use futures::future::BoxFuture;
use tokio::runtime::Handle;

use crate::ConfigError;

/// Runs computations and delivers their results.
///
/// Everything a [`Memoizer`](crate::Memoizer) hands to its scheduler runs on a later scheduling
/// step, and never from within the call that scheduled it. This is what guarantees that
/// completions are always delivered asynchronously.
pub trait Scheduler: Send + Sync + 'static {
    /// Runs `task` to completion in the background.
    fn spawn(&self, task: BoxFuture<'static, ()>);

    /// Runs `f` on a later scheduling step.
    fn defer(&self, f: Box<dyn FnOnce() + Send>) {
        self.spawn(Box::pin(async move { f() }))
    }
}

/// A [`Scheduler`] that spawns tasks onto a tokio runtime.
///
/// With a current-thread runtime, all computations and completions are interleaved cooperatively
/// on a single thread.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Creates a scheduler spawning onto the runtime behind `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates a scheduler for the runtime this is called from.
    pub fn current() -> Result<Self, ConfigError> {
        let handle = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        Ok(Self::new(handle))
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("runtime", &self.handle.runtime_flavor())
            .finish()
    }
}

impl Scheduler for TokioScheduler {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        // Tasks are detached, there is no cancellation of running computations.
        drop(self.handle.spawn(task));
    }
}
