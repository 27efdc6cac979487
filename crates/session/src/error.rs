use patchpilot_context::ContextError;
use patchpilot_indexer::{IndexError, ReadError};
use patchpilot_proposal::ApplyError;
use patchpilot_protocol::{PathError, SettingsError};
use thiserror::Error;

/// Failure reported by a [`ModelClient`](crate::ModelClient)
/// implementation. The engine never retries; the caller decides.
#[derive(Debug, Error)]
#[error("model provider failed: {0}")]
pub struct ProviderError(pub String);

/// Umbrella error for session operations. Every sub-crate failure is
/// recoverable at the operation boundary; the session itself stays
/// usable.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{0} proposal(s) still pending; apply or discard them first")]
    PendingProposals(usize),

    #[error("no parsed proposal batch")]
    NoBatch,

    #[error("no proposal at index {0}")]
    NoProposal(usize),

    #[error("failed to diff '{path}': {source}")]
    Diff {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SessionError>;
