use std::future::Future;
use std::marker::PhantomData;

use futures::future::{BoxFuture, FutureExt};

/// The computation that is being memoized.
///
/// The computation receives the full argument list of a call and asynchronously produces either
/// an output or an error. Both are considered results, and both are delivered to every caller
/// that was waiting for them.
///
/// The computation itself is the context it is invoked in: any state it needs is part of the
/// implementing value, which is bound once when the [`Memoizer`](crate::Memoizer) is built. Use
/// [`from_fn`] and [`with_context`] to create a computation from a closure.
pub trait Computation: Send + Sync + 'static {
    /// The arguments of a single call, usually a tuple.
    type Args;
    /// The successful result of the computation.
    type Output: Send + Sync + 'static;
    /// The error result of the computation.
    type Error: Send + Sync + 'static;

    /// Starts computing the result for `args`.
    ///
    /// This is called at most once per key at a time. The returned future is driven to completion
    /// by the [`Scheduler`](crate::Scheduler) even if no caller is interested in its result
    /// anymore.
    fn compute(&self, args: Self::Args) -> BoxFuture<'static, Result<Self::Output, Self::Error>>;
}

/// A [`Computation`] backed by a closure, see [`from_fn`].
pub struct FnComputation<F, A, Fut> {
    f: F,
    _marker: PhantomData<fn(A) -> Fut>,
}

/// Creates a [`Computation`] from a closure returning a future.
///
/// ```
/// let add = async_memo::from_fn(|(a, b): (u32, u32)| async move {
///     Ok::<_, std::convert::Infallible>(a + b)
/// });
/// # let _ = add;
/// ```
pub fn from_fn<A, F, Fut, T, E>(f: F) -> FnComputation<F, A, Fut>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    FnComputation {
        f,
        _marker: PhantomData,
    }
}

impl<A, F, Fut, T, E> Computation for FnComputation<F, A, Fut>
where
    A: 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    type Args = A;
    type Output = T;
    type Error = E;

    fn compute(&self, args: A) -> BoxFuture<'static, Result<T, E>> {
        (self.f)(args).boxed()
    }
}

/// A [`Computation`] that is invoked with an explicit context, see [`with_context`].
pub struct ContextFn<C, F, A, Fut> {
    context: C,
    f: F,
    _marker: PhantomData<fn(A) -> Fut>,
}

impl<C, F, A, Fut> ContextFn<C, F, A, Fut> {
    /// The context the computation is invoked with.
    pub fn context(&self) -> &C {
        &self.context
    }
}

/// Creates a [`Computation`] from a closure that is invoked with a reference to `context`.
///
/// The context is supplied once, and every invocation of the computation receives it as its first
/// argument. Everything the returned future needs from the context has to be copied out of it
/// before the future is created.
pub fn with_context<C, A, F, Fut, T, E>(context: C, f: F) -> ContextFn<C, F, A, Fut>
where
    C: Send + Sync + 'static,
    F: Fn(&C, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    ContextFn {
        context,
        f,
        _marker: PhantomData,
    }
}

impl<C, A, F, Fut, T, E> Computation for ContextFn<C, F, A, Fut>
where
    C: Send + Sync + 'static,
    A: 'static,
    F: Fn(&C, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    type Args = A;
    type Output = T;
    type Error = E;

    fn compute(&self, args: A) -> BoxFuture<'static, Result<T, E>> {
        (self.f)(&self.context, args).boxed()
    }
}
