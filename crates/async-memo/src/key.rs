use std::fmt::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// The separator between stringified arguments, and between a generated key prefix and the key.
///
/// This is the ASCII group separator, which does not appear in ordinary stringified values.
pub const SEPARATOR: char = '\x1d';

/// Turns the arguments of a call into a cache key.
///
/// Returning `None` bypasses memoization for that call: the computation is invoked directly, and
/// neither the store nor the running computations are consulted.
pub type Canonicalizer<A> = Arc<dyn Fn(&A) -> Option<String> + Send + Sync>;

/// An argument list that can be stringified element by element.
///
/// This is implemented for tuples of up to 8 elements that implement [`Display`](fmt::Display),
/// and is the requirement for the default [`display_key`] canonicalizer.
pub trait ArgumentList {
    /// Writes every argument into `out`, separated by [`SEPARATOR`].
    fn write_key(&self, out: &mut String) -> fmt::Result;
}

impl ArgumentList for () {
    fn write_key(&self, _out: &mut String) -> fmt::Result {
        Ok(())
    }
}

macro_rules! impl_argument_list {
    ($first:ident $(, $rest:ident)*) => {
        impl<$first: fmt::Display $(, $rest: fmt::Display)*> ArgumentList for ($first, $($rest,)*) {
            #[allow(non_snake_case)]
            fn write_key(&self, out: &mut String) -> fmt::Result {
                let ($first, $($rest,)*) = self;
                write!(out, "{}", $first)?;
                $(
                    out.push(SEPARATOR);
                    write!(out, "{}", $rest)?;
                )*
                Ok(())
            }
        }
    };
}

impl_argument_list!(A);
impl_argument_list!(A, B);
impl_argument_list!(A, B, C);
impl_argument_list!(A, B, C, D);
impl_argument_list!(A, B, C, D, E);
impl_argument_list!(A, B, C, D, E, F);
impl_argument_list!(A, B, C, D, E, F, G);
impl_argument_list!(A, B, C, D, E, F, G, H);

/// The default canonicalizer, which stringifies every argument and joins them with [`SEPARATOR`].
pub fn display_key<A: ArgumentList>(args: &A) -> Option<String> {
    let mut key = String::new();
    args.write_key(&mut key).ok()?;
    Some(key)
}

/// A canonicalizer that serializes the arguments to JSON.
///
/// Object keys are emitted in sorted order, so maps that are equal but were built in a different
/// order end up with the same key. A tuple of arguments is serialized element by element, joined
/// with [`SEPARATOR`].
///
/// Arguments that fail to serialize bypass memoization.
pub fn canonical_json<A: Serialize>(args: &A) -> Option<String> {
    let value = match serde_json::to_value(args) {
        Ok(value) => value,
        Err(error) => {
            tracing::debug!(
                error = &error as &dyn std::error::Error,
                "Arguments are not serializable, bypassing memoization"
            );
            return None;
        }
    };

    // `serde_json::Map` is ordered by key, which is what makes this canonical.
    let key = match value {
        serde_json::Value::Array(values) => {
            let mut key = String::new();
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    key.push(SEPARATOR);
                }
                write!(key, "{value}").ok()?;
            }
            key
        }
        value => value.to_string(),
    };
    Some(key)
}

/// Allocates key prefixes for memoizers that share a store.
///
/// Every allocated prefix is a unique counter value followed by [`SEPARATOR`]. The process-wide
/// instance returned by [`KeyPrefixes::global`] is statically initialized and starts counting at 1.
#[derive(Debug)]
pub struct KeyPrefixes {
    next: AtomicU64,
}

impl KeyPrefixes {
    /// Creates a new registry, starting at 1.
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// The process-wide registry used by memoizers without an explicit key prefix.
    pub fn global() -> &'static KeyPrefixes {
        static GLOBAL: KeyPrefixes = KeyPrefixes::new();
        &GLOBAL
    }

    /// Allocates the next unique prefix.
    pub fn next_prefix(&self) -> String {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{id}{SEPARATOR}")
    }
}

impl Default for KeyPrefixes {
    fn default() -> Self {
        Self::new()
    }
}
