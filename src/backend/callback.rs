//! Completion callbacks for writes.
//!
//! Backends report the outcome of `put`/`delete` through a [`WriteCallback`].
//! The callback is shared (`Arc`) so a backend may hold on to it and complete
//! from another thread.

use crate::error::{StoreError, StoreResult};
use std::sync::Arc;

/// Receives the outcome of a single write.
///
/// `value` is the written value for puts and `None` for deletes.
pub trait WriteCallback<V>: Send + Sync {
    fn on_success(&self, space: &str, key: &str, value: Option<&V>);

    fn on_error(&self, space: &str, key: &str, value: Option<&V>, cause: StoreError);
}

/// Shared handle to a write callback.
pub type Callback<V> = Arc<dyn WriteCallback<V>>;

/// Routes a finished write to its callback.
///
/// With a callback, both outcomes are reported there and `Ok(())` is
/// returned. Without one, the error is handed back to the caller.
pub fn deliver<V>(
    callback: Option<&Callback<V>>,
    space: &str,
    key: &str,
    value: Option<&V>,
    result: StoreResult<()>,
) -> StoreResult<()> {
    match (callback, result) {
        (Some(cb), Ok(())) => {
            cb.on_success(space, key, value);
            Ok(())
        }
        (Some(cb), Err(err)) => {
            cb.on_error(space, key, value, err);
            Ok(())
        }
        (None, result) => result,
    }
}

/// Adapts a closure over the outcome into a callback.
///
/// # Example
///
/// ```
/// use stashkv::backend::callback::{from_fn, Callback};
/// use bytes::Bytes;
///
/// let cb: Callback<Bytes> = from_fn(|space, key, outcome| {
///     if let Err(err) = outcome {
///         eprintln!("write to {}:{} failed: {}", space, key, err);
///     }
/// });
/// ```
pub fn from_fn<V, F>(f: F) -> Callback<V>
where
    V: 'static,
    F: Fn(&str, &str, Result<Option<&V>, StoreError>) + Send + Sync + 'static,
{
    Arc::new(FnCallback(f))
}

struct FnCallback<F>(F);

impl<V, F> WriteCallback<V> for FnCallback<F>
where
    F: Fn(&str, &str, Result<Option<&V>, StoreError>) + Send + Sync,
{
    fn on_success(&self, space: &str, key: &str, value: Option<&V>) {
        (self.0)(space, key, Ok(value))
    }

    fn on_error(&self, space: &str, key: &str, _value: Option<&V>, cause: StoreError) {
        (self.0)(space, key, Err(cause))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Outcome recorded by [`Recorder`].
    #[derive(Debug, Clone, PartialEq)]
    pub enum Outcome<V> {
        Success(String, String, Option<V>),
        Error(String, String, Option<V>, String),
    }

    /// Callback that remembers every outcome.
    pub struct Recorder<V> {
        pub outcomes: Mutex<Vec<Outcome<V>>>,
    }

    impl<V> Recorder<V> {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(Vec::new()),
            })
        }

        pub fn take(&self) -> Vec<Outcome<V>> {
            std::mem::take(&mut *self.outcomes.lock())
        }
    }

    impl<V: Clone + Send + Sync> WriteCallback<V> for Recorder<V> {
        fn on_success(&self, space: &str, key: &str, value: Option<&V>) {
            self.outcomes.lock().push(Outcome::Success(
                space.to_string(),
                key.to_string(),
                value.cloned(),
            ));
        }

        fn on_error(&self, space: &str, key: &str, value: Option<&V>, cause: StoreError) {
            self.outcomes.lock().push(Outcome::Error(
                space.to_string(),
                key.to_string(),
                value.cloned(),
                cause.to_string(),
            ));
        }
    }
}
