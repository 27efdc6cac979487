use serde::{Deserialize, Serialize};

use crate::parser::ChangeProposal;

/// Per-proposal review state. `Applied` and `Discarded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    Pending,
    Applied,
    Discarded,
}

/// The pending batch of proposals produced by one assistant turn. At most
/// one batch exists at a time; a new request must resolve or discard the
/// previous one first.
#[derive(Debug)]
pub struct ProposalBatch {
    items: Vec<(ChangeProposal, ProposalState)>,
}

impl ProposalBatch {
    pub fn new(proposals: Vec<ChangeProposal>) -> Self {
        Self {
            items: proposals
                .into_iter()
                .map(|p| (p, ProposalState::Pending))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&ChangeProposal> {
        self.items.get(idx).map(|(p, _)| p)
    }

    pub fn state(&self, idx: usize) -> Option<ProposalState> {
        self.items.get(idx).map(|(_, s)| *s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChangeProposal, ProposalState)> {
        self.items.iter().map(|(p, s)| (p, *s))
    }

    /// Proposals still awaiting a decision, with their batch indexes.
    pub fn pending(&self) -> impl Iterator<Item = (usize, &ChangeProposal)> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, (_, s))| *s == ProposalState::Pending)
            .map(|(i, (p, _))| (i, p))
    }

    /// True once no proposal is pending.
    pub fn is_resolved(&self) -> bool {
        self.pending().next().is_none()
    }

    /// Marks a pending proposal applied. Terminal states are never
    /// overwritten; returns whether the transition happened.
    pub fn mark_applied(&mut self, idx: usize) -> bool {
        self.transition(idx, ProposalState::Applied)
    }

    /// Marks a pending proposal discarded without touching the filesystem.
    pub fn mark_discarded(&mut self, idx: usize) -> bool {
        self.transition(idx, ProposalState::Discarded)
    }

    /// Discards every pending proposal; returns how many were discarded.
    pub fn discard_all(&mut self) -> usize {
        let mut count = 0;
        for (_, state) in &mut self.items {
            if *state == ProposalState::Pending {
                *state = ProposalState::Discarded;
                count += 1;
            }
        }
        count
    }

    fn transition(&mut self, idx: usize, next: ProposalState) -> bool {
        match self.items.get_mut(idx) {
            Some((_, state)) if *state == ProposalState::Pending => {
                *state = next;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::EditKind;
    use std::path::PathBuf;

    fn proposal(rel: &str) -> ChangeProposal {
        ChangeProposal {
            rel_path: rel.to_string(),
            abs_path: PathBuf::from("/tmp").join(rel),
            content: String::new(),
            kind: EditKind::Create,
            rationale: None,
        }
    }

    #[test]
    fn states_are_terminal() {
        let mut batch = ProposalBatch::new(vec![proposal("a.txt"), proposal("b.txt")]);
        assert!(!batch.is_resolved());

        assert!(batch.mark_applied(0));
        assert!(!batch.mark_discarded(0)); // already terminal
        assert_eq!(batch.state(0), Some(ProposalState::Applied));

        assert!(batch.mark_discarded(1));
        assert!(!batch.mark_applied(1));
        assert!(batch.is_resolved());
    }

    #[test]
    fn discard_all_only_touches_pending() {
        let mut batch = ProposalBatch::new(vec![proposal("a.txt"), proposal("b.txt")]);
        batch.mark_applied(0);

        assert_eq!(batch.discard_all(), 1);
        assert_eq!(batch.state(0), Some(ProposalState::Applied));
        assert_eq!(batch.state(1), Some(ProposalState::Discarded));
    }
}
