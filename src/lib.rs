//! Batched, deduplicating, concurrent data fetching.
//!
//! Describe a computation over remote data as a composable [`Fetch`]
//! value, then run it. Independent requests against the same source are
//! coalesced into one batched call, requests against distinct sources run
//! in parallel within a round, and each distinct identity is fetched at
//! most once per execution through a caller-supplied cache.
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use batchfetch::{fetch, join, DataSource, NonEmpty, Query};
//!
//! struct Numbers;
//!
//! impl DataSource for Numbers {
//!     type Identity = u32;
//!     type Result = String;
//!
//!     fn name(&self) -> String {
//!         "numbers".to_string()
//!     }
//!
//!     fn fetch_one(&self, id: u32) -> Query<Option<String>> {
//!         Query::now(Some(id.to_string()))
//!     }
//!
//!     fn fetch_many(&self, ids: NonEmpty<u32>) -> Query<HashMap<u32, String>> {
//!         Query::now(ids.into_iter().map(|id| (id, id.to_string())).collect())
//!     }
//! }
//!
//! let numbers = Arc::new(Numbers);
//! let description = join(fetch(1, numbers.clone()), fetch(2, numbers));
//!
//! let (env, pair) = futures::executor::block_on(description.run_env()).unwrap();
//! assert_eq!(pair, ("1".to_string(), "2".to_string()));
//! // Both identities were served by one batched call in one round.
//! assert_eq!(env.rounds().len(), 1);
//! assert_eq!(env.total_batches(), 1);
//! ```

mod cache;
mod env;
mod error;
mod fetch;
mod plan;
mod query;
mod runner;
mod source;

#[cfg(test)]
mod test;

pub use cache::{Cache, CacheExt, CacheKey, CachedValue, InMemoryCache};
pub use env::{Env, Round, RoundKind};
pub use error::{BoxError, FetchError};
pub use fetch::{fetch, fetch_many, join, sequence, traverse, Fetch};
pub use query::Query;
pub use source::{DataSource, NonEmpty};
