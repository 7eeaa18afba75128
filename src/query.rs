//! Deferred computations handed back by data sources.

use std::future::Future;

use futures::future::{BoxFuture, FutureExt};

use crate::error::BoxError;

/// A deferred, possibly-failing computation producing a `T`.
///
/// Queries are pure descriptions: building one performs no work. The
/// interpreter evaluates a query only when the round containing it
/// dispatches. A source picks the variant matching how its data arrives:
///
/// - [`Query::Now`] for values that are already in hand;
/// - [`Query::Later`] for synchronous work (run on the driving task);
/// - [`Query::Async`] for work that completes through the executor.
///
/// An `Async` query completes at most once; dropping the execution before
/// completion cancels it.
pub enum Query<T> {
    /// A value that is already available.
    Now(T),
    /// A synchronous thunk, invoked at dispatch time.
    Later(Box<dyn FnOnce() -> Result<T, BoxError> + Send>),
    /// An asynchronous computation.
    Async(BoxFuture<'static, Result<T, BoxError>>),
}

impl<T> Query<T> {
    /// Lift an already-computed value.
    pub fn now(value: T) -> Self {
        Query::Now(value)
    }

    /// Defer a synchronous computation.
    pub fn later(thunk: impl FnOnce() -> Result<T, BoxError> + Send + 'static) -> Self {
        Query::Later(Box::new(thunk))
    }

    /// Defer an asynchronous computation.
    pub fn from_future(
        future: impl Future<Output = Result<T, BoxError>> + Send + 'static,
    ) -> Self {
        Query::Async(future.boxed())
    }

    /// Evaluate the query. Only the interpreter does this, and only once
    /// per dispatched query.
    pub(crate) async fn run(self) -> Result<T, BoxError> {
        match self {
            Query::Now(value) => Ok(value),
            Query::Later(thunk) => thunk(),
            Query::Async(future) => future.await,
        }
    }
}
