//! The user-facing data-source contract and the type-erased handles the
//! planner uses to group requests across sources of different types.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::cache::{CacheKey, CachedValue};
use crate::error::FetchError;
use crate::query::Query;

/// A sequence that is guaranteed to hold at least one element. Batch
/// requests are built from this type, so an empty batch cannot be
/// expressed at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmpty<T> {
    head: T,
    tail: Vec<T>,
}

#[allow(clippy::len_without_is_empty)]
impl<T> NonEmpty<T> {
    pub fn new(head: T) -> Self {
        Self {
            head,
            tail: Vec::new(),
        }
    }

    /// `None` when `items` is empty; this is the only rejection the
    /// constructor performs.
    pub fn from_vec(items: Vec<T>) -> Option<Self> {
        let mut items = items.into_iter();
        let head = items.next()?;
        Some(Self {
            head,
            tail: items.collect(),
        })
    }

    pub fn push(&mut self, item: T) {
        self.tail.push(item);
    }

    /// Always at least 1.
    pub fn len(&self) -> usize {
        1 + self.tail.len()
    }

    pub fn head(&self) -> &T {
        &self.head
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        std::iter::once(&self.head).chain(self.tail.iter())
    }

    pub fn into_vec(self) -> Vec<T> {
        let mut items = Vec::with_capacity(1 + self.tail.len());
        items.push(self.head);
        items.extend(self.tail);
        items
    }

    pub(crate) fn map<U>(self, mut f: impl FnMut(T) -> U) -> NonEmpty<U> {
        NonEmpty {
            head: f(self.head),
            tail: self.tail.into_iter().map(&mut f).collect(),
        }
    }
}

impl<T> IntoIterator for NonEmpty<T> {
    type Item = T;
    type IntoIter = std::iter::Chain<std::iter::Once<T>, std::vec::IntoIter<T>>;

    fn into_iter(self) -> Self::IntoIter {
        std::iter::once(self.head).chain(self.tail)
    }
}

/// A user-provided resolver from identities to results.
///
/// The planner calls `fetch_many` whenever two or more identities for this
/// source survive cache filtering in a round, and `fetch_one` when exactly
/// one does. `fetch_many` over a single identity must agree with
/// `fetch_one` over that identity. Implementations must not rely on call
/// ordering relative to other sources within a round.
pub trait DataSource: Send + Sync + 'static {
    /// The caller's handle to a remote record.
    type Identity: Clone + Eq + Hash + Debug + Send + 'static;
    /// What the source resolves an identity to.
    type Result: Clone + Send + Sync + 'static;

    /// Stable name for this source. The name namespaces the cache and lets
    /// the planner recognize requests for the same source across disparate
    /// parts of a description, so it must be unique among the sources used
    /// together in one execution.
    fn name(&self) -> String;

    /// Resolve one identity. `None` means the identity does not exist,
    /// which fails the execution.
    fn fetch_one(&self, identity: Self::Identity) -> Query<Option<Self::Result>>;

    /// Resolve a batch in one call. An identity absent from the returned
    /// map fails the execution; entries that were not requested are
    /// ignored and never cached.
    fn fetch_many(
        &self,
        identities: NonEmpty<Self::Identity>,
    ) -> Query<HashMap<Self::Identity, Self::Result>>;

    /// Stable key for an identity within this source. The default renders
    /// the identity with `Debug`; override it when that rendering is not
    /// deterministic.
    fn identity_key(&self, identity: &Self::Identity) -> String {
        format!("{:?}", identity)
    }
}

/// An identity with its concrete type erased, carrying the cache key it
/// will resolve under.
pub(crate) struct ErasedId {
    pub(crate) key: CacheKey,
    pub(crate) identity: Box<dyn Any + Send>,
}

impl Debug for ErasedId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.key.fmt(f)
    }
}

/// Object-safe face of a [`DataSource`], keyed by name. The interpreter
/// only ever talks to sources through this trait.
pub(crate) trait ErasedSource: Send + Sync {
    fn name(&self) -> String;

    /// Resolve one round's worth of identities for this source. `ids` is
    /// non-empty and deduplicated. The returned pairs cover the requested
    /// identities the source knew about; the completeness check upstream
    /// turns any gap into a failure.
    fn dispatch(
        &self,
        ids: Vec<ErasedId>,
    ) -> BoxFuture<'static, Result<Vec<(CacheKey, CachedValue)>, FetchError>>;
}

pub(crate) struct SourceHandle<S> {
    source: Arc<S>,
}

impl<S: DataSource> SourceHandle<S> {
    pub(crate) fn erased(source: Arc<S>) -> Arc<dyn ErasedSource> {
        Arc::new(SourceHandle { source })
    }
}

impl<S: DataSource> ErasedSource for SourceHandle<S> {
    fn name(&self) -> String {
        self.source.name()
    }

    fn dispatch(
        &self,
        ids: Vec<ErasedId>,
    ) -> BoxFuture<'static, Result<Vec<(CacheKey, CachedValue)>, FetchError>> {
        let source = Arc::clone(&self.source);
        let name = self.source.name();

        // Recover the concrete identity type up front, so a grouping error
        // fails loudly at dispatch rather than as a silent miss.
        let mut typed: Vec<(CacheKey, S::Identity)> = Vec::with_capacity(ids.len());
        for ErasedId { key, identity } in ids {
            match identity.downcast::<S::Identity>() {
                Ok(identity) => typed.push((key, *identity)),
                Err(_) => panic!(
                    "identity of a foreign type dispatched to data source {}; source names must be unique",
                    name
                ),
            }
        }

        async move {
            let mut results = Vec::with_capacity(typed.len());

            if typed.len() == 1 {
                let (key, identity) = typed.pop().expect("dispatch group was empty");
                let value = source
                    .fetch_one(identity)
                    .run()
                    .await
                    .map_err(|error| FetchError::Source {
                        source_name: name,
                        error,
                    })?;
                if let Some(value) = value {
                    results.push((key, Arc::new(value) as CachedValue));
                }
            } else {
                let identities =
                    NonEmpty::from_vec(typed.iter().map(|(_, identity)| identity.clone()).collect())
                        .expect("dispatch group was empty");
                let values = source
                    .fetch_many(identities)
                    .run()
                    .await
                    .map_err(|error| FetchError::Source {
                        source_name: name,
                        error,
                    })?;
                // Walking the requested pairs (rather than the returned
                // map) drops unrequested extras and leaves genuine misses
                // absent for the completeness check.
                for (key, identity) in typed {
                    if let Some(value) = values.get(&identity) {
                        results.push((key, Arc::new(value.clone()) as CachedValue));
                    }
                }
            }

            Ok(results)
        }
        .boxed()
    }
}
