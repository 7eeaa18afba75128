#![cfg(test)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::executor;

use crate::{
    fetch, join, Cache, CacheKey, DataSource, Fetch, FetchError, InMemoryCache, NonEmpty, Query,
};

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
fn pure_value_needs_no_round() {
    let (env, value) = executor::block_on(Fetch::pure(7).map(|v| v + 1).run_env()).unwrap();

    assert_eq!(value, 8);
    assert!(env.rounds().is_empty());
}

#[test]
fn flat_map_on_pure_is_immediate() {
    let numbers = Arc::new(NumberSource::default());
    let source = Arc::clone(&numbers);
    let description = Fetch::pure(5).flat_map(move |id| fetch(id, source));

    let (env, value) = executor::block_on(description.run_env()).unwrap();

    assert_eq!(value, "5");
    assert_eq!(env.rounds().len(), 1);
    assert_eq!(numbers.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn join_of_done_values_pairs_immediately() {
    let (env, pair) =
        executor::block_on(join(Fetch::pure(1), Fetch::pure("a")).run_env()).unwrap();

    assert_eq!(pair, (1, "a"));
    assert!(env.rounds().is_empty());
}

#[test]
fn map_passes_errors_through() {
    let result = executor::block_on(Fetch::<usize>::error("boom").map(|v| v + 1).run());

    assert!(matches!(result, Err(FetchError::User(..))));
}

#[test]
fn join_error_wins_without_dispatch() {
    let numbers = Arc::new(NumberSource::default());
    let description = join(Fetch::<String>::error("boom"), fetch(1, Arc::clone(&numbers)));

    let result = executor::block_on(description.run());

    assert!(matches!(result, Err(FetchError::User(..))));
    assert_eq!(numbers.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn identity_keys_render_with_debug() {
    let numbers = NumberSource::default();

    assert_eq!(numbers.identity_key(&7), "7");
}

#[test]
fn nonempty_construction() {
    assert!(NonEmpty::<usize>::from_vec(Vec::new()).is_none());

    let mut ids = NonEmpty::new(1);
    ids.push(2);
    ids.push(3);

    assert_eq!(ids.len(), 3);
    assert_eq!(ids.head(), &1);
    assert_eq!(ids.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(ids.into_vec(), vec![1, 2, 3]);
}

#[test]
fn cache_updates_are_functional() {
    let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
    let key = CacheKey::new("numbers", "1");
    let updated = cache.update(key.clone(), Arc::new("one".to_string()));

    // The original handle is a snapshot; only the derived cache holds the
    // write.
    assert!(cache.get(&key).is_none());
    let value = updated.get(&key).expect("value was just written");
    assert_eq!(value.downcast_ref::<String>(), Some(&"one".to_string()));
}
