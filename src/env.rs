//! The execution record threaded through an interpreter run: the cache
//! plus an append-only log of the rounds performed.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{Cache, CacheExt, CacheKey, CachedValue};

/// What one round asked its sources for, by stable identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundKind {
    /// A single identity against a single source.
    One {
        source: String,
        identity: String,
    },
    /// Several identities against a single source.
    Many {
        source: String,
        identities: Vec<String>,
    },
    /// Identities against several sources at once, grouped per source in
    /// first-seen order.
    Concurrent {
        sources: Vec<(String, Vec<String>)>,
    },
}

/// Record of one interpreter step.
#[derive(Debug, Clone)]
pub struct Round {
    /// The requested identities, grouped by source.
    pub kind: RoundKind,
    /// True when every identity was served from the cache and no source
    /// was called.
    pub cached: bool,
    /// Identities served from the cache.
    pub hits: usize,
    /// Identities dispatched to sources.
    pub fetched: usize,
    /// Dispatches that went through `fetch_many`.
    pub batches: usize,
    /// When the round started planning.
    pub start: Instant,
    /// When the round's results were merged.
    pub end: Instant,
}

impl Round {
    pub fn duration(&self) -> Duration {
        self.end.duration_since(self.start)
    }
}

/// A cache and a round log threaded through execution. The log orders
/// rounds by execution time.
#[derive(Clone)]
pub struct Env {
    cache: Arc<dyn Cache>,
    rounds: Vec<Round>,
}

impl Env {
    pub(crate) fn new(cache: Arc<dyn Cache>) -> Self {
        Self {
            cache,
            rounds: Vec::new(),
        }
    }

    /// The cache as of the last completed round.
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Every round performed so far, oldest first.
    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    /// Total identities dispatched to sources across all rounds.
    pub fn total_fetched(&self) -> usize {
        self.rounds.iter().map(|round| round.fetched).sum()
    }

    /// Total `fetch_many` dispatches across all rounds.
    pub fn total_batches(&self) -> usize {
        self.rounds.iter().map(|round| round.batches).sum()
    }

    pub(crate) fn store(&mut self, entries: Vec<(CacheKey, CachedValue)>) {
        if entries.is_empty() {
            return;
        }
        self.cache = self.cache.update_all(entries);
    }

    pub(crate) fn record(&mut self, round: Round) {
        self.rounds.push(round);
    }
}

impl Debug for Env {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("rounds", &self.rounds)
            .field("cache", &"<cache>")
            .finish()
    }
}
