use crate::env::Env;

/// Boxed error type used by data sources and by errors lifted into a
/// description with [`Fetch::error`](crate::Fetch::error).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The ways an execution can fail.
///
/// `MissingIdentity` carries the [`Env`] as of the failing round, so callers
/// can observe which rounds ran and what had been cached before the miss.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// An error lifted into the description by the caller.
    #[error("{0}")]
    User(BoxError),

    /// A data source failed while evaluating one of its queries.
    #[error("data source {source_name} failed: {error}")]
    Source {
        /// Name of the failing source.
        source_name: String,
        /// The underlying error.
        error: BoxError,
    },

    /// A requested identity was absent from its source's response. By
    /// contract this is a hard failure; there is no partial recovery.
    #[error("identity {identity} missing from data source {source_name}")]
    MissingIdentity {
        /// Name of the source that omitted the identity.
        source_name: String,
        /// Stable key of the missing identity.
        identity: String,
        /// Execution record up to and including the round that exposed
        /// the miss. Its cache holds the writes of all preceding
        /// successful rounds, and nothing from the failed one.
        env: Box<Env>,
    },
}

impl FetchError {
    /// The execution record attached to this error, if any.
    pub fn env(&self) -> Option<&Env> {
        match self {
            FetchError::MissingIdentity { env, .. } => Some(env),
            _ => None,
        }
    }
}
