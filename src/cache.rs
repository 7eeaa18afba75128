//! The cache protocol that mediates deduplication, and the default
//! in-memory implementation.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Globally identifies one identity: the owning source's stable name plus
/// the identity's stable key within that source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    source: String,
    identity: String,
}

impl CacheKey {
    pub fn new(source: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            identity: identity.into(),
        }
    }

    /// The data source's stable name.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The identity's stable key within its source.
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

/// A resolved result with its concrete type erased. Typed values are
/// recovered by downcasting to the owning source's result type.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// A functional store of already-resolved results.
///
/// `update` returns a cache reflecting the write; the receiver is left
/// untouched, so an [`Env`](crate::Env) captured in an error holds a
/// snapshot rather than a view of a mutating store. Implementations are
/// free to drop writes (a forgetful cache): the interpreter keeps no memo
/// of its own, so every reference to a forgotten identity is refetched.
pub trait Cache: Send + Sync {
    /// Look up a previously-updated value.
    fn get(&self, key: &CacheKey) -> Option<CachedValue>;

    /// Derive a cache that also holds `value` under `key`.
    fn update(&self, key: CacheKey, value: CachedValue) -> Arc<dyn Cache>;
}

/// Batch-update convenience over any [`Cache`] handle.
pub trait CacheExt {
    /// Fold `entries` into the cache with repeated [`Cache::update`]s.
    fn update_all(&self, entries: Vec<(CacheKey, CachedValue)>) -> Arc<dyn Cache>;
}

impl CacheExt for Arc<dyn Cache> {
    fn update_all(&self, entries: Vec<(CacheKey, CachedValue)>) -> Arc<dyn Cache> {
        entries
            .into_iter()
            .fold(Arc::clone(self), |cache, (key, value)| {
                cache.update(key, value)
            })
    }
}

/// The default cache: a copy-on-write hash map. Each `update` clones the
/// underlying table, so handed-out snapshots never observe later writes.
/// Values are `Arc`ed, making the clone shallow.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: HashMap<CacheKey, CachedValue>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style pre-population, mostly useful for tests and for
    /// seeding an execution with values fetched elsewhere.
    #[must_use]
    pub fn with<T: Send + Sync + 'static>(mut self, key: CacheKey, value: T) -> Self {
        self.entries.insert(key, Arc::new(value));
        self
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        self.entries.get(key).cloned()
    }

    fn update(&self, key: CacheKey, value: CachedValue) -> Arc<dyn Cache> {
        let mut entries = self.entries.clone();
        entries.insert(key, value);
        Arc::new(InMemoryCache { entries })
    }
}

impl Debug for InMemoryCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
