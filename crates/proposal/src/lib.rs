//! Turning model replies into reviewable, appliable file edits.
//!
//! The flow mirrors the review loop of the assistant: a raw model response
//! is parsed into [`ChangeProposal`]s, each proposal can be diffed against
//! the live file, and a [`ChangeApplier`] writes accepted proposals to disk
//! behind the [`AdminMode`] gate.

mod apply;
mod batch;
mod diff;
mod error;
mod parser;

pub use apply::{AdminMode, ApplyAction, ApplyReport, ApplyResult, ChangeApplier, ExecReport};
pub use batch::{ProposalBatch, ProposalState};
pub use diff::{DiffEngine, DiffLine, DiffOp, DiffResult};
pub use error::{ApplyError, Result};
pub use parser::{ChangeProposal, EditKind, ParseOutcome, ParseWarning, ProposalParser};
