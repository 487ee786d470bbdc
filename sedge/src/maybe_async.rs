//! Uniform handling of values that may or may not still be pending.
//!
//! Resolvers are allowed to answer synchronously or with a future, and the
//! executor must not pay for future composition when everything is already
//! here: an operation whose resolvers all answer synchronously completes
//! without allocating or scheduling a single task. [`MaybeAsync`] is the
//! tagged union that carries this guarantee through the whole completion
//! pipeline: combinators inspect the tag before touching any continuation,
//! and a ready value is never wrapped into an already-resolved future.

use std::future::{Future, IntoFuture};

use futures::future::{self, BoxFuture, Either, FutureExt as _};

/// A value of `T` that is either ready or still being produced.
pub enum MaybeAsync<T> {
    /// The value is available now.
    Ready(T),
    /// The value arrives once the wrapped future is driven to completion.
    Pending(BoxFuture<'static, T>),
}

impl<T: Send + 'static> MaybeAsync<T> {
    /// Wraps a future as a pending value.
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self::Pending(fut.boxed())
    }

    /// Indicates whether the value is still being produced.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Unwraps a ready value, or panics.
    ///
    /// Only meant for callers that have already checked [`is_pending`].
    ///
    /// [`is_pending`]: MaybeAsync::is_pending
    pub fn expect_ready(self, msg: &str) -> T {
        match self {
            Self::Ready(v) => v,
            Self::Pending(_) => panic!("{msg}"),
        }
    }

    /// Applies `f` to the value once it is available.
    ///
    /// A ready value is transformed in place without scheduling.
    pub fn map<U, F>(self, f: F) -> MaybeAsync<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            Self::Ready(v) => MaybeAsync::Ready(f(v)),
            Self::Pending(fut) => MaybeAsync::Pending(fut.map(f).boxed()),
        }
    }

    /// Chains a computation that itself may be pending.
    ///
    /// When both this value and the one produced by `f` are ready, the result
    /// is ready.
    pub fn and_then<U, F>(self, f: F) -> MaybeAsync<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> MaybeAsync<U> + Send + 'static,
    {
        match self {
            Self::Ready(v) => f(v),
            Self::Pending(fut) => MaybeAsync::Pending(async move { f(fut.await).await }.boxed()),
        }
    }

    /// Combines a list of values into a value of a list, preserving order.
    ///
    /// If no element is pending, the result is ready; otherwise all elements
    /// are awaited together.
    pub fn all(items: Vec<Self>) -> MaybeAsync<Vec<T>> {
        if items.iter().any(Self::is_pending) {
            MaybeAsync::Pending(
                future::join_all(items.into_iter().map(IntoFuture::into_future)).boxed(),
            )
        } else {
            MaybeAsync::Ready(
                items
                    .into_iter()
                    .map(|i| i.expect_ready("no element is pending"))
                    .collect(),
            )
        }
    }

    /// Combines keyed values into a value of keyed pairs, preserving key
    /// order. The object-shaped counterpart of [`all`].
    ///
    /// [`all`]: MaybeAsync::all
    pub fn all_keyed(items: Vec<(String, Self)>) -> MaybeAsync<Vec<(String, T)>> {
        if items.iter().any(|(_, v)| v.is_pending()) {
            MaybeAsync::Pending(
                future::join_all(items.into_iter().map(|(k, v)| {
                    let fut = v.into_future();
                    async move { (k, fut.await) }
                }))
                .boxed(),
            )
        } else {
            MaybeAsync::Ready(
                items
                    .into_iter()
                    .map(|(k, v)| (k, v.expect_ready("no element is pending")))
                    .collect(),
            )
        }
    }
}

impl<T: Send + 'static> IntoFuture for MaybeAsync<T> {
    type Output = T;
    type IntoFuture = Either<future::Ready<T>, BoxFuture<'static, T>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Self::Ready(v) => Either::Left(future::ready(v)),
            Self::Pending(fut) => Either::Right(fut),
        }
    }
}
