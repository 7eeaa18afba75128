//! These tests pin down the cache protocol: repeated references are
//! served from the cache, pre-populated values suppress dispatches
//! entirely, and a cache that drops writes forces refetching.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use batchfetch::{
    fetch, join, Cache, CacheKey, CachedValue, DataSource, InMemoryCache, NonEmpty, Query,
    RoundKind,
};
use futures::executor;

#[derive(Default)]
struct NumberSource {
    calls: AtomicUsize,
}

impl DataSource for NumberSource {
    type Identity = usize;
    type Result = String;

    fn name(&self) -> String {
        "numbers".to_string()
    }

    fn fetch_one(&self, id: usize) -> Query<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Query::now(Some(id.to_string()))
    }

    fn fetch_many(&self, ids: NonEmpty<usize>) -> Query<HashMap<usize, String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Query::now(ids.into_iter().map(|id| (id, id.to_string())).collect())
    }
}

#[test]
fn repeated_reference_is_served_from_cache() {
    let numbers = Arc::new(NumberSource::default());
    let again = Arc::clone(&numbers);
    let description = fetch(1, Arc::clone(&numbers)).flat_map(move |_| fetch(1, again));

    let (env, value) = executor::block_on(description.run_env()).unwrap();

    assert_eq!(value, "1");
    assert_eq!(env.rounds().len(), 2);
    assert!(!env.rounds()[0].cached);
    assert!(env.rounds()[1].cached);
    assert_eq!(env.rounds()[1].hits, 1);
    assert_eq!(env.total_fetched(), 1);
    assert_eq!(numbers.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn duplicate_identities_in_one_round_fetch_once() {
    let numbers = Arc::new(NumberSource::default());
    let description = join(
        fetch(1, Arc::clone(&numbers)),
        fetch(1, Arc::clone(&numbers)),
    );

    let (env, value) = executor::block_on(description.run_env()).unwrap();

    assert_eq!(value, ("1".to_string(), "1".to_string()));
    assert_eq!(env.rounds().len(), 1);
    assert_eq!(
        env.rounds()[0].kind,
        RoundKind::One {
            source: "numbers".to_string(),
            identity: "1".to_string(),
        }
    );
    assert_eq!(env.total_fetched(), 1);
    assert_eq!(numbers.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn prepopulated_cache_suppresses_dispatch() {
    let numbers = Arc::new(NumberSource::default());
    let cache = InMemoryCache::new()
        .with(CacheKey::new("numbers", "1"), "1".to_string())
        .with(CacheKey::new("numbers", "2"), "2".to_string());

    let description = join(
        fetch(1, Arc::clone(&numbers)),
        fetch(2, Arc::clone(&numbers)),
    );
    let (env, value) = executor::block_on(description.run_env_with(Arc::new(cache))).unwrap();

    assert_eq!(value, ("1".to_string(), "2".to_string()));
    assert_eq!(numbers.calls.load(Ordering::SeqCst), 0);
    assert_eq!(env.rounds().len(), 1);
    assert!(env.rounds()[0].cached);
    assert_eq!(env.rounds()[0].hits, 2);
    assert_eq!(env.total_fetched(), 0);
}

/// A cache that drops every write.
struct ForgetfulCache;

impl Cache for ForgetfulCache {
    fn get(&self, _key: &CacheKey) -> Option<CachedValue> {
        None
    }

    fn update(&self, _key: CacheKey, _value: CachedValue) -> Arc<dyn Cache> {
        Arc::new(ForgetfulCache)
    }
}

#[test]
fn forgetful_cache_forces_refetching() {
    let numbers = Arc::new(NumberSource::default());
    let again = Arc::clone(&numbers);
    let description = fetch(1, Arc::clone(&numbers)).flat_map(move |_| fetch(1, again));

    let (env, value) =
        executor::block_on(description.run_env_with(Arc::new(ForgetfulCache))).unwrap();

    assert_eq!(value, "1");
    assert_eq!(env.rounds().len(), 2);
    assert!(!env.rounds()[1].cached);
    assert_eq!(env.total_fetched(), 2);
    assert_eq!(numbers.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn run_env_exposes_cached_values() {
    let numbers = Arc::new(NumberSource::default());

    let (env, _) = executor::block_on(fetch(1, numbers).run_env()).unwrap();

    let cached = env
        .cache()
        .get(&CacheKey::new("numbers", "1"))
        .expect("fetched value was cached");
    assert_eq!(cached.downcast_ref::<String>(), Some(&"1".to_string()));
}
