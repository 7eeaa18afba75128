//! The execution engine: drives a description round by round against the
//! cache and its data sources until a value or an error remains.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future;
use log::{debug, trace};

use crate::cache::{Cache, CacheKey, CachedValue, InMemoryCache};
use crate::env::{Env, Round, RoundKind};
use crate::error::FetchError;
use crate::fetch::{Fetch, FetchState, ResolvedValues};
use crate::plan::plan_round;

impl<T: Send + 'static> Fetch<T> {
    /// Execute the description with a fresh cache, producing its value.
    pub async fn run(self) -> Result<T, FetchError> {
        self.run_with(Arc::new(InMemoryCache::new())).await
    }

    /// Execute the description against `cache`, producing its value.
    pub async fn run_with(self, cache: Arc<dyn Cache>) -> Result<T, FetchError> {
        let (_, value) = self.run_env_with(cache).await?;
        Ok(value)
    }

    /// Execute with a fresh cache and also return the execution record.
    pub async fn run_env(self) -> Result<(Env, T), FetchError> {
        self.run_env_with(Arc::new(InMemoryCache::new())).await
    }

    /// Execute against `cache` and also return the execution record.
    pub async fn run_env_with(self, cache: Arc<dyn Cache>) -> Result<(Env, T), FetchError> {
        let (env, terminal) = drive(self, cache).await?;
        match terminal.state {
            FetchState::Done(value) => Ok((env, value)),
            FetchState::Error(error) => Err(error),
            _ => panic!("interpreter returned a non-terminal description"),
        }
    }

    /// Execute with a fresh cache and return the terminal description
    /// instead of unwrapping it. A description-level error comes back as
    /// the terminal; failures inside a round are still raised.
    pub async fn run_fetch(self) -> Result<(Env, Fetch<T>), FetchError> {
        self.run_fetch_with(Arc::new(InMemoryCache::new())).await
    }

    /// Like [`Fetch::run_fetch`], against `cache`.
    pub async fn run_fetch_with(
        self,
        cache: Arc<dyn Cache>,
    ) -> Result<(Env, Fetch<T>), FetchError> {
        drive(self, cache).await
    }
}

/// The interpreter loop. Each iteration plans the frontier, serves what it
/// can from the cache, dispatches the rest in parallel, records the round
/// and resumes the continuation with the resolved values.
async fn drive<T: Send + 'static>(
    fetch: Fetch<T>,
    cache: Arc<dyn Cache>,
) -> Result<(Env, Fetch<T>), FetchError> {
    let mut env = Env::new(cache);
    let mut current = fetch;

    loop {
        let (requests, cont) = match current.state {
            FetchState::Done(value) => return Ok((env, Fetch::pure(value))),
            FetchState::Error(error) => return Ok((env, Fetch::from_error(error))),
            FetchState::Blocked(request, cont) => (vec![request], cont),
            FetchState::Concurrent(requests, cont) => (requests, cont),
        };

        let start = Instant::now();
        let plan = plan_round(requests);

        let requested: Vec<(String, Vec<String>)> = plan
            .groups
            .iter()
            .map(|group| {
                let ids = group
                    .ids
                    .iter()
                    .map(|id| id.key.identity().to_string())
                    .collect();
                (group.name.clone(), ids)
            })
            .collect();
        let kind = round_kind(&requested);

        // Partition each group against the current cache; only the
        // missing identities are dispatched.
        let mut resolved = ResolvedValues::new();
        let mut hits = 0;
        let mut names = Vec::new();
        let mut pending: Vec<Vec<CacheKey>> = Vec::new();
        let mut dispatches = Vec::new();

        for group in plan.groups {
            let mut missing = Vec::new();
            for id in group.ids {
                match env.cache().get(&id.key) {
                    Some(value) => {
                        hits += 1;
                        resolved.insert(id.key.clone(), value);
                    }
                    None => missing.push(id),
                }
            }
            if missing.is_empty() {
                trace!("source {} fully served from cache", group.name);
                continue;
            }
            let keys: Vec<CacheKey> = missing.iter().map(|id| id.key.clone()).collect();
            dispatches.push(group.source.dispatch(missing));
            names.push(group.name);
            pending.push(keys);
        }

        let fetched: usize = pending.iter().map(|keys| keys.len()).sum();
        let batches = pending.iter().filter(|keys| keys.len() > 1).count();
        let cached = dispatches.is_empty();

        debug!(
            "dispatching round: {} group(s), {} identities, {} cache hit(s)",
            names.len(),
            fetched,
            hits
        );

        // All groups overlap; the first failure wins and the survivors'
        // results are discarded without touching the cache.
        let outcomes = future::try_join_all(dispatches).await?;

        let end = Instant::now();
        let mut fresh: Vec<(CacheKey, CachedValue)> = Vec::new();
        for ((source_name, keys), outcome) in names.into_iter().zip(pending).zip(outcomes) {
            let mut returned: HashMap<CacheKey, CachedValue> = outcome.into_iter().collect();
            for key in keys {
                match returned.remove(&key) {
                    Some(value) => fresh.push((key, value)),
                    None => {
                        env.record(Round {
                            kind,
                            cached: false,
                            hits,
                            fetched,
                            batches,
                            start,
                            end: Instant::now(),
                        });
                        return Err(FetchError::MissingIdentity {
                            source_name,
                            identity: key.identity().to_string(),
                            env: Box::new(env),
                        });
                    }
                }
            }
        }

        for (key, value) in &fresh {
            resolved.insert(key.clone(), Arc::clone(value));
        }
        env.store(fresh);
        env.record(Round {
            kind,
            cached,
            hits,
            fetched,
            batches,
            start,
            end,
        });
        debug!("round complete in {:?}", end.duration_since(start));

        current = cont(&resolved);
    }
}

fn round_kind(requested: &[(String, Vec<String>)]) -> RoundKind {
    match requested {
        [(source, ids)] if ids.len() == 1 => RoundKind::One {
            source: source.clone(),
            identity: ids[0].clone(),
        },
        [(source, ids)] => RoundKind::Many {
            source: source.clone(),
            identities: ids.clone(),
        },
        groups => RoundKind::Concurrent {
            sources: groups.to_vec(),
        },
    }
}
