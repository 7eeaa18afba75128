//! Extraction of a description's ready frontier into per-source groups.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::cache::CacheKey;
use crate::source::{ErasedId, ErasedSource, NonEmpty};

/// A single pending request carried by a `Blocked` or `Concurrent` node.
pub(crate) struct FetchRequest {
    pub(crate) source: Arc<dyn ErasedSource>,
    pub(crate) kind: RequestKind,
}

#[derive(Debug)]
pub(crate) enum RequestKind {
    One(ErasedId),
    Many(NonEmpty<ErasedId>),
}

impl RequestKind {
    fn into_ids(self) -> Vec<ErasedId> {
        match self {
            RequestKind::One(id) => vec![id],
            RequestKind::Many(ids) => ids.into_vec(),
        }
    }
}

impl Debug for FetchRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("source", &self.source.name())
            .field("kind", &self.kind)
            .finish()
    }
}

/// One source's share of a round: every distinct identity the frontier
/// wants from it.
pub(crate) struct SourceGroup {
    pub(crate) name: String,
    pub(crate) source: Arc<dyn ErasedSource>,
    pub(crate) ids: Vec<ErasedId>,
}

/// The batchable frontier of a description, grouped by source in
/// first-seen order.
pub(crate) struct RoundPlan {
    pub(crate) groups: Vec<SourceGroup>,
}

/// Group the frontier's requests by source name, set-unioning identities
/// so that each distinct identity appears in the round exactly once. No
/// continuation is executed here.
pub(crate) fn plan_round(requests: Vec<FetchRequest>) -> RoundPlan {
    let mut groups: Vec<SourceGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut seen: HashSet<CacheKey> = HashSet::new();

    for request in requests {
        let name = request.source.name();
        let slot = *index.entry(name.clone()).or_insert_with(|| {
            groups.push(SourceGroup {
                name,
                source: Arc::clone(&request.source),
                ids: Vec::new(),
            });
            groups.len() - 1
        });

        for id in request.kind.into_ids() {
            if seen.insert(id.key.clone()) {
                groups[slot].ids.push(id);
            }
        }
    }

    RoundPlan { groups }
}
