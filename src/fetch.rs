//! The description type and its combinators.
//!
//! A [`Fetch`] is an immutable tree denoting a computation over remote
//! data. Nothing is fetched while a description is being built; the
//! interpreter walks the tree round by round, replacing blocked leaves
//! with resolved values, until only a value (or an error) remains.

use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::cache::{CacheKey, CachedValue};
use crate::error::{BoxError, FetchError};
use crate::plan::{FetchRequest, RequestKind};
use crate::source::{DataSource, ErasedId, NonEmpty, SourceHandle};

/// The values one round produced: cache hits plus freshly fetched
/// results, keyed by cache key. Continuations read from this set when the
/// description resumes; they never reach back into the threaded cache, so
/// a cache that drops writes still sees every reference refetched.
pub(crate) struct ResolvedValues {
    values: HashMap<CacheKey, CachedValue>,
}

impl ResolvedValues {
    pub(crate) fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, key: CacheKey, value: CachedValue) {
        self.values.insert(key, value);
    }

    pub(crate) fn get<T: Clone + 'static>(&self, key: &CacheKey) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }
}

/// A continuation from one round's resolved values to the next
/// description. Each step allocates the next tree from scratch; no node
/// refers back into the one it replaces.
pub(crate) type Cont<T> = Box<dyn FnOnce(&ResolvedValues) -> Fetch<T> + Send>;

pub(crate) enum FetchState<T> {
    /// A resolved pure value.
    Done(T),
    /// A lifted failure.
    Error(FetchError),
    /// One pending request feeding a continuation.
    Blocked(FetchRequest, Cont<T>),
    /// Independent pending requests that may run in the same round, with a
    /// single continuation receiving all their results. None of the
    /// requests may observe another's result.
    Concurrent(Vec<FetchRequest>, Cont<T>),
}

/// An immutable description of a computation over remote data.
///
/// Build descriptions with [`Fetch::pure`], [`fetch`], [`fetch_many`] and
/// combine them with [`Fetch::map`], [`Fetch::flat_map`], [`join`],
/// [`sequence`] and [`traverse`]. Run them with the `run*` methods.
pub struct Fetch<T> {
    pub(crate) state: FetchState<T>,
}

impl<T: Send + 'static> Fetch<T> {
    /// Lift a value into a description. No round is performed for it.
    pub fn pure(value: T) -> Self {
        Fetch {
            state: FetchState::Done(value),
        }
    }

    /// Lift a failure into a description. The failure surfaces when the
    /// execution first reaches it.
    pub fn error(error: impl Into<BoxError>) -> Self {
        Fetch {
            state: FetchState::Error(FetchError::User(error.into())),
        }
    }

    pub(crate) fn from_error(error: FetchError) -> Self {
        Fetch {
            state: FetchState::Error(error),
        }
    }

    /// Transform the eventual value. A `Done` value maps immediately; an
    /// `Error` passes through; otherwise `f` rides along in the
    /// continuation.
    pub fn map<U: Send + 'static>(self, f: impl FnOnce(T) -> U + Send + 'static) -> Fetch<U> {
        match self.state {
            FetchState::Done(value) => Fetch::pure(f(value)),
            FetchState::Error(error) => Fetch::from_error(error),
            FetchState::Blocked(request, k) => Fetch {
                state: FetchState::Blocked(request, Box::new(move |resolved| k(resolved).map(f))),
            },
            FetchState::Concurrent(requests, k) => Fetch {
                state: FetchState::Concurrent(
                    requests,
                    Box::new(move |resolved| k(resolved).map(f)),
                ),
            },
        }
    }

    /// Sequence a dependent description after this one. The bind is a
    /// strict data dependency: whatever `f` requests cannot enter a round
    /// until this description has resolved, so a chain of `flat_map`s
    /// costs one round per link. Use [`join`] or [`traverse`] for
    /// independent requests.
    pub fn flat_map<U: Send + 'static>(
        self,
        f: impl FnOnce(T) -> Fetch<U> + Send + 'static,
    ) -> Fetch<U> {
        match self.state {
            FetchState::Done(value) => f(value),
            FetchState::Error(error) => Fetch::from_error(error),
            FetchState::Blocked(request, k) => Fetch {
                state: FetchState::Blocked(
                    request,
                    Box::new(move |resolved| k(resolved).flat_map(f)),
                ),
            },
            FetchState::Concurrent(requests, k) => Fetch {
                state: FetchState::Concurrent(
                    requests,
                    Box::new(move |resolved| k(resolved).flat_map(f)),
                ),
            },
        }
    }
}

impl<T> Debug for Fetch<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.state {
            FetchState::Done(..) => f.write_str("Fetch::Done"),
            FetchState::Error(error) => f.debug_tuple("Fetch::Error").field(error).finish(),
            FetchState::Blocked(request, _) => f
                .debug_struct("Fetch::Blocked")
                .field("request", request)
                .field("continuation", &"<closure>")
                .finish(),
            FetchState::Concurrent(requests, _) => f
                .debug_struct("Fetch::Concurrent")
                .field("requests", requests)
                .field("continuation", &"<closure>")
                .finish(),
        }
    }
}

/// Describe fetching a single identity from `source`.
pub fn fetch<S: DataSource>(identity: S::Identity, source: Arc<S>) -> Fetch<S::Result> {
    let key = CacheKey::new(source.name(), source.identity_key(&identity));
    let request = FetchRequest {
        source: SourceHandle::erased(source),
        kind: RequestKind::One(ErasedId {
            key: key.clone(),
            identity: Box::new(identity),
        }),
    };
    let cont: Cont<S::Result> = Box::new(move |resolved| match resolved.get::<S::Result>(&key) {
        Some(value) => Fetch::pure(value),
        None => panic!("no resolved value for fetched identity {:?}", key),
    });
    Fetch {
        state: FetchState::Blocked(request, cont),
    }
}

/// Describe fetching several identities from one `source` in a single
/// batch. Results come back in input order; duplicate identities are
/// fetched once but each position is filled.
pub fn fetch_many<S: DataSource>(
    identities: NonEmpty<S::Identity>,
    source: Arc<S>,
) -> Fetch<Vec<S::Result>> {
    let erased = identities.map(|identity| {
        let key = CacheKey::new(source.name(), source.identity_key(&identity));
        ErasedId {
            key,
            identity: Box::new(identity),
        }
    });
    let keys: Vec<CacheKey> = erased.iter().map(|id| id.key.clone()).collect();
    let request = FetchRequest {
        source: SourceHandle::erased(source),
        kind: RequestKind::Many(erased),
    };
    let cont: Cont<Vec<S::Result>> = Box::new(move |resolved| {
        let values: Vec<S::Result> = keys
            .iter()
            .map(|key| match resolved.get::<S::Result>(key) {
                Some(value) => value,
                None => panic!("no resolved value for fetched identity {:?}", key),
            })
            .collect();
        Fetch::pure(values)
    });
    Fetch {
        state: FetchState::Blocked(request, cont),
    }
}

/// Combine two independent descriptions into one producing both values.
///
/// Pending requests on both sides merge into a single frontier, so they
/// share a round: same-source requests coalesce into one batch, requests
/// against distinct sources run in parallel. If either side is a lifted
/// error, the error wins.
pub fn join<A, B>(fa: Fetch<A>, fb: Fetch<B>) -> Fetch<(A, B)>
where
    A: Send + 'static,
    B: Send + 'static,
{
    use FetchState::*;

    let state = match (fa.state, fb.state) {
        (Error(error), _) | (_, Error(error)) => Error(error),
        (Done(a), Done(b)) => Done((a, b)),
        (Done(a), Blocked(request, k)) => Blocked(
            request,
            Box::new(move |resolved| join(Fetch::pure(a), k(resolved))),
        ),
        (Blocked(request, k), Done(b)) => Blocked(
            request,
            Box::new(move |resolved| join(k(resolved), Fetch::pure(b))),
        ),
        (Done(a), Concurrent(requests, k)) => Concurrent(
            requests,
            Box::new(move |resolved| join(Fetch::pure(a), k(resolved))),
        ),
        (Concurrent(requests, k), Done(b)) => Concurrent(
            requests,
            Box::new(move |resolved| join(k(resolved), Fetch::pure(b))),
        ),
        (Blocked(r1, k1), Blocked(r2, k2)) => Concurrent(
            vec![r1, r2],
            Box::new(move |resolved| join(k1(resolved), k2(resolved))),
        ),
        (Blocked(r1, k1), Concurrent(mut requests, k2)) => {
            requests.insert(0, r1);
            Concurrent(
                requests,
                Box::new(move |resolved| join(k1(resolved), k2(resolved))),
            )
        }
        (Concurrent(mut requests, k1), Blocked(r2, k2)) => {
            requests.push(r2);
            Concurrent(
                requests,
                Box::new(move |resolved| join(k1(resolved), k2(resolved))),
            )
        }
        (Concurrent(mut r1, k1), Concurrent(r2, k2)) => {
            r1.extend(r2);
            Concurrent(
                r1,
                Box::new(move |resolved| join(k1(resolved), k2(resolved))),
            )
        }
    };

    Fetch { state }
}

/// Collapse a list of descriptions into one producing all their values,
/// in order.
///
/// The fold uses [`join`], never [`Fetch::flat_map`], so the whole list
/// exposes its frontier in a single round rather than degrading to one
/// round per element.
pub fn sequence<T: Send + 'static>(fetches: Vec<Fetch<T>>) -> Fetch<Vec<T>> {
    fetches
        .into_iter()
        .fold(Fetch::pure(Vec::new()), |acc, next| {
            join(acc, next).map(|(mut values, value)| {
                values.push(value);
                values
            })
        })
}

/// Map each item to a description and collapse the lot with [`sequence`].
pub fn traverse<I, T, F>(items: impl IntoIterator<Item = I>, f: F) -> Fetch<Vec<T>>
where
    T: Send + 'static,
    F: FnMut(I) -> Fetch<T>,
{
    sequence(items.into_iter().map(f).collect())
}
