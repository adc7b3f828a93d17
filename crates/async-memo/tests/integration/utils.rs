use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_memo::{Computation, Memoizer, from_fn};

pub use async_memo_test::{advance_to, ms, setup};

/// Counts how often a computation was invoked.
#[derive(Clone, Debug, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    /// Records an invocation, returning the number of invocations so far.
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A computation that adds its arguments and the number of times it has been invoked.
///
/// The first call with `(10, 10)` thus yields `21`, and every recomputation is visible in the
/// result.
pub fn adder(calls: &Calls) -> impl Computation<Args = (u32, u32), Output = u32, Error = Infallible>
{
    let calls = calls.clone();
    from_fn(move |(a, b): (u32, u32)| {
        let call = calls.bump() as u32;
        async move { Ok(a + b + call) }
    })
}

/// Calls the memoizer and unwraps the successful result.
pub async fn value<C>(memo: &Memoizer<C>, args: C::Args) -> C::Output
where
    C: Computation,
    C::Output: Clone,
    C::Error: fmt::Debug,
{
    let outcome = memo.call(args).await.unwrap();
    match &*outcome {
        Ok(value) => value.clone(),
        Err(error) => panic!("computation failed: {error:?}"),
    }
}
