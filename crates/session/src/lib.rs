//! Session facade for the patchpilot engine.
//!
//! A [`Session`] binds one project root to its file index, the set of
//! pinned context files, and the proposal review loop. The model backend
//! is injected through [`ModelClient`]; everything else is local.
//!
//! Typical flow:
//!
//! ```text
//! open -> pin -> ask/parse_response -> diff -> apply_all -> reindex
//! ```

mod client;
mod error;
mod prompt;
mod session;

pub use client::ModelClient;
pub use error::{ProviderError, Result, SessionError};
pub use session::{Session, SETTINGS_FILE};

// The sub-crate types a caller needs to drive a session.
pub use patchpilot_context::{ContextEntry, Materialized};
pub use patchpilot_indexer::{IndexedFile, ScanStats};
pub use patchpilot_proposal::{
    AdminMode, ApplyAction, ApplyReport, ChangeProposal, DiffOp, DiffResult, EditKind,
    ParseOutcome, ProposalState,
};
pub use patchpilot_protocol::{PromptTurn, Role, Settings};
