use thiserror::Error;

/// Unified result type for the coordinator.
pub type Result<T> = std::result::Result<T, IdempotencyError>;

/// Errors surfaced by [`process`](crate::IdempotentProcessor::process) and the
/// services behind it.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// The wrapped action failed. Nothing is cached; the action's own error is
    /// preserved as the source so callers can downcast it.
    #[error("action failed for key {key}: {source}")]
    Action {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// The storage backend failed a read or write. Propagated as-is; a backend
    /// outage is never reinterpreted as a cache miss.
    #[error("storage backend error for key {key}: {source}")]
    Storage {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Lock bookkeeping failed. Fatal and never retried. The in-process
    /// coordinator releases unconditionally and cannot produce this; the
    /// variant exists for substitute coordination backends.
    #[error("key coordination fault for {key}: {reason}")]
    Coordination { key: String, reason: String },
}

impl IdempotencyError {
    pub(crate) fn action(key: &str, source: anyhow::Error) -> Self {
        Self::Action {
            key: key.to_string(),
            source,
        }
    }

    pub(crate) fn storage(key: &str, source: anyhow::Error) -> Self {
        Self::Storage {
            key: key.to_string(),
            source,
        }
    }
}
