use std::path::Path;

use patchpilot_context::ContextSet;
use patchpilot_indexer::{ProjectIndex, ScanStats};
use patchpilot_proposal::{
    AdminMode, ApplyReport, ApplyResult, ChangeApplier, DiffEngine, DiffResult, ExecReport,
    ParseOutcome, ProposalBatch, ProposalParser,
};
use patchpilot_protocol::{PathPolicy, PromptTurn, Settings};

use crate::client::ModelClient;
use crate::error::{Result, SessionError};
use crate::prompt;

/// Name of the optional per-project settings file, looked up in the
/// project root by [`Session::open`].
pub const SETTINGS_FILE: &str = "patchpilot.toml";

/// Facade tying the index, the pinned context, and the proposal review
/// loop together for one project root.
///
/// Construction scans the project once; a root that cannot be indexed
/// aborts the session, every later failure is recoverable. At most one
/// proposal batch is buffered at a time, and it must be applied or
/// discarded before the next model reply can be parsed.
pub struct Session {
    settings: Settings,
    policy: PathPolicy,
    index: ProjectIndex,
    context: ContextSet,
    applier: ChangeApplier,
    batch: Option<ProposalBatch>,
}

impl Session {
    /// Opens a session at `root`, reading `patchpilot.toml` from the root
    /// when present and falling back to defaults otherwise.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let settings_path = root.join(SETTINGS_FILE);
        let settings = if settings_path.is_file() {
            let mut loaded = Settings::load(&settings_path)?;
            loaded.project_root = root.to_path_buf();
            loaded
        } else {
            Settings::for_root(root)
        };
        Self::with_settings(settings)
    }

    pub fn with_settings(settings: Settings) -> Result<Self> {
        let policy = PathPolicy::new(&settings.project_root)?;
        let index = ProjectIndex::scan(&policy, &settings.ignore_patterns)?;
        let applier = ChangeApplier::new(policy.clone(), &settings);
        log::info!(
            "session opened at {} ({} files indexed)",
            policy.root().display(),
            index.len()
        );
        Ok(Self {
            settings,
            policy,
            index,
            context: ContextSet::new(),
            applier,
            batch: None,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index(&self) -> &ProjectIndex {
        &self.index
    }

    pub fn admin_mode(&self) -> AdminMode {
        self.applier.admin()
    }

    pub fn set_admin_mode(&mut self, admin: AdminMode) {
        self.applier.set_admin(admin);
    }

    /// Pins a file or a directory's direct children; returns the newly
    /// pinned relative paths.
    pub fn pin(&mut self, raw: &str) -> Result<Vec<String>> {
        Ok(self.context.pin(raw, &self.index, &self.policy)?)
    }

    /// Unpins one path, or the whole set when `raw` is `"all"`. Returns
    /// how many pins were removed; unpinning an absent path removes zero.
    pub fn unpin(&mut self, raw: &str) -> usize {
        if raw.trim().eq_ignore_ascii_case("all") {
            self.context.unpin_all()
        } else {
            usize::from(self.context.unpin(raw, &self.policy).is_some())
        }
    }

    pub fn list_pinned(&self) -> &[String] {
        self.context.pinned()
    }

    /// Case-insensitive substring search over indexed relative paths.
    pub fn find(&self, needle: &str) -> Vec<String> {
        self.index
            .find(needle)
            .map(|f| f.rel_path.clone())
            .collect()
    }

    /// Rescans the project. On failure the previous snapshot is kept.
    pub fn reindex(&mut self) -> Result<&ScanStats> {
        Ok(self.index.reindex()?)
    }

    pub fn tree(&self) -> String {
        self.index.tree()
    }

    /// Assembles the prompt for `user_text`: system header, project tree,
    /// one block per pinned file, user turn. Returns the turns together
    /// with the paths dropped to fit the context budget.
    pub fn build_prompt(&self, user_text: &str) -> (Vec<PromptTurn>, Vec<String>) {
        let materialized = self.context.materialize(
            &self.index,
            self.settings.context_budget_bytes,
            self.settings.max_pinned_file_bytes,
        );
        for failure in &materialized.failures {
            log::warn!("pinned '{}' is unreadable: {}", failure.rel_path, failure.error);
        }
        if materialized.overflowed() {
            log::warn!(
                "context budget exceeded; dropped {} file(s)",
                materialized.dropped.len()
            );
        }

        let turns = prompt::assemble(
            self.policy.root(),
            self.applier.admin(),
            &self.tree(),
            &materialized,
            user_text,
        );
        (turns, materialized.dropped)
    }

    /// One full round trip: build the prompt, call the client, parse the
    /// reply into a proposal batch.
    pub fn ask(&mut self, client: &dyn ModelClient, user_text: &str) -> Result<ParseOutcome> {
        self.ensure_no_pending()?;
        let (turns, _dropped) = self.build_prompt(user_text);
        let response = client.complete(&turns)?;
        self.parse_response(&response)
    }

    /// Parses a raw model reply into proposals and buffers them for
    /// review. Fails while a previous batch is still pending.
    pub fn parse_response(&mut self, response: &str) -> Result<ParseOutcome> {
        self.ensure_no_pending()?;
        let outcome = ProposalParser::new(&self.policy).parse(response);
        self.batch = if outcome.proposals.is_empty() {
            None
        } else {
            Some(ProposalBatch::new(outcome.proposals.clone()))
        };
        Ok(outcome)
    }

    pub fn batch(&self) -> Option<&ProposalBatch> {
        self.batch.as_ref()
    }

    /// Diff of one buffered proposal against the live file.
    pub fn diff(&self, idx: usize) -> Result<DiffResult> {
        let batch = self.batch.as_ref().ok_or(SessionError::NoBatch)?;
        let proposal = batch.get(idx).ok_or(SessionError::NoProposal(idx))?;
        DiffEngine::compute(proposal).map_err(|source| SessionError::Diff {
            path: proposal.rel_path.clone(),
            source,
        })
    }

    /// Applies one buffered proposal. Success marks it applied; failures
    /// leave it pending.
    pub fn apply(&mut self, idx: usize) -> Result<ApplyReport> {
        let batch = self.batch.as_ref().ok_or(SessionError::NoBatch)?;
        let proposal = batch
            .get(idx)
            .cloned()
            .ok_or(SessionError::NoProposal(idx))?;
        let report = self.applier.apply(&proposal)?;
        if let Some(batch) = self.batch.as_mut() {
            batch.mark_applied(idx);
        }
        Ok(report)
    }

    /// Applies every pending proposal independently; one failure does not
    /// block the rest.
    pub fn apply_all(&mut self) -> Result<Vec<ApplyResult>> {
        let mut batch = self.batch.take().ok_or(SessionError::NoBatch)?;
        let results = self.applier.apply_all(&mut batch);
        self.batch = Some(batch);
        Ok(results)
    }

    /// Discards one pending proposal, leaving the rest reviewable. Returns
    /// `false` when the proposal was already applied or discarded.
    pub fn discard(&mut self, idx: usize) -> Result<bool> {
        let batch = self.batch.as_mut().ok_or(SessionError::NoBatch)?;
        if batch.get(idx).is_none() {
            return Err(SessionError::NoProposal(idx));
        }
        Ok(batch.mark_discarded(idx))
    }

    /// Discards every pending proposal; returns how many were discarded.
    pub fn discard_all(&mut self) -> usize {
        match self.batch.as_mut() {
            Some(batch) => batch.discard_all(),
            None => 0,
        }
    }

    /// Runs the configured test command in the project root, if any.
    pub fn run_test_command(&self) -> Option<ExecReport> {
        self.applier.run_test_command()
    }

    fn ensure_no_pending(&self) -> Result<()> {
        if let Some(batch) = &self.batch {
            let pending = batch.pending().count();
            if pending > 0 {
                return Err(SessionError::PendingProposals(pending));
            }
        }
        Ok(())
    }
}
