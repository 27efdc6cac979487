use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

use crate::parser::ChangeProposal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffOp {
    Equal,
    Insert,
    Delete,
}

/// One line of the edit script, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub op: DiffOp,
    pub text: String,
}

/// Line-level diff between the on-disk file and a proposal's content.
/// Derived, never persisted; recomputed on demand against live state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffResult {
    pub rel_path: String,
    pub lines: Vec<DiffLine>,
}

impl DiffResult {
    pub fn insertions(&self) -> usize {
        self.lines.iter().filter(|l| l.op == DiffOp::Insert).count()
    }

    pub fn deletions(&self) -> usize {
        self.lines.iter().filter(|l| l.op == DiffOp::Delete).count()
    }

    /// True when the proposal matches the file exactly.
    pub fn is_noop(&self) -> bool {
        self.lines.iter().all(|l| l.op == DiffOp::Equal)
    }
}

/// LCS-based line diff. Deterministic: identical inputs always produce the
/// identical record sequence.
pub struct DiffEngine;

impl DiffEngine {
    /// Compares the proposal against the file's current content (empty for
    /// a file that does not exist yet) at call time.
    pub fn compute(proposal: &ChangeProposal) -> std::io::Result<DiffResult> {
        let current = if proposal.abs_path.exists() {
            let bytes = std::fs::read(&proposal.abs_path)?;
            String::from_utf8_lossy(&bytes).into_owned()
        } else {
            String::new()
        };
        Ok(Self::compute_against(proposal, &current))
    }

    /// Pure diff of proposal content against a caller-supplied snapshot.
    pub fn compute_against(proposal: &ChangeProposal, current: &str) -> DiffResult {
        let diff = TextDiff::from_lines(current, &proposal.content);
        let lines = diff
            .iter_all_changes()
            .map(|change| {
                let op = match change.tag() {
                    ChangeTag::Equal => DiffOp::Equal,
                    ChangeTag::Insert => DiffOp::Insert,
                    ChangeTag::Delete => DiffOp::Delete,
                };
                DiffLine {
                    op,
                    text: change.value().trim_end_matches('\n').to_string(),
                }
            })
            .collect();
        DiffResult {
            rel_path: proposal.rel_path.clone(),
            lines,
        }
    }
}
