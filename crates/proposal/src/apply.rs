use std::path::Path;
use std::process::Command;

use patchpilot_protocol::{PathPolicy, Settings};
use serde::{Deserialize, Serialize};

use crate::batch::ProposalBatch;
use crate::error::{ApplyError, Result};
use crate::parser::ChangeProposal;

/// Captured output is capped so a chatty script cannot flood the session.
const MAX_CAPTURED_OUTPUT: usize = 8_192;

/// Write permission and execute permission are deliberately separate
/// toggles: being allowed to write files says nothing about being allowed
/// to run them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminMode {
    pub writes: bool,
    pub execute: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyAction {
    Created,
    Modified,
}

/// Outcome of launching a written script. Best-effort: a failed launch is
/// recorded here and never rolls back the file write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecReport {
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
    pub rel_path: String,
    pub action: ApplyAction,
    pub exec: Option<ExecReport>,
}

/// Per-proposal result from [`ChangeApplier::apply_all`].
#[derive(Debug)]
pub struct ApplyResult {
    pub rel_path: String,
    pub outcome: Result<ApplyReport>,
}

/// Writes accepted proposals to disk, gated by [`AdminMode`]. Every target
/// is re-resolved through the path policy at apply time.
pub struct ChangeApplier {
    policy: PathPolicy,
    admin: AdminMode,
    exec_extensions: Vec<String>,
    test_command: Option<String>,
}

impl ChangeApplier {
    pub fn new(policy: PathPolicy, settings: &Settings) -> Self {
        Self {
            policy,
            admin: AdminMode {
                writes: settings.admin_writes,
                execute: settings.admin_execute,
            },
            exec_extensions: settings.exec_extensions.clone(),
            test_command: settings.test_command.clone(),
        }
    }

    pub fn admin(&self) -> AdminMode {
        self.admin
    }

    pub fn set_admin(&mut self, admin: AdminMode) {
        log::info!(
            "admin mode changed: writes={} execute={}",
            admin.writes,
            admin.execute
        );
        self.admin = admin;
    }

    /// Writes one proposal's content to its target, creating parent
    /// directories as needed. Fails with `PermissionDenied` before any
    /// write when admin writes are off.
    pub fn apply(&self, proposal: &ChangeProposal) -> Result<ApplyReport> {
        if !self.admin.writes {
            return Err(ApplyError::PermissionDenied);
        }

        // Re-validate at apply time; the tree may have changed since parse.
        let abs = self.policy.resolve(&proposal.rel_path)?;
        let created = !abs.exists();

        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ApplyError::Io {
                path: proposal.rel_path.clone(),
                source,
            })?;
        }
        std::fs::write(&abs, &proposal.content).map_err(|source| ApplyError::Io {
            path: proposal.rel_path.clone(),
            source,
        })?;

        let action = if created {
            ApplyAction::Created
        } else {
            ApplyAction::Modified
        };
        log::info!(
            "{} '{}' ({} bytes)",
            match action {
                ApplyAction::Created => "created",
                ApplyAction::Modified => "modified",
            },
            proposal.rel_path,
            proposal.content.len()
        );

        let exec = if self.admin.execute && self.is_exec_target(&abs) {
            Some(self.run_script(&abs))
        } else {
            None
        };

        Ok(ApplyReport {
            rel_path: proposal.rel_path.clone(),
            action,
            exec,
        })
    }

    /// Applies every pending proposal in the batch independently; one
    /// failure does not block the rest. Successes transition to `Applied`,
    /// failures stay pending for the caller to retry or discard.
    pub fn apply_all(&self, batch: &mut ProposalBatch) -> Vec<ApplyResult> {
        let pending: Vec<usize> = batch.pending().map(|(i, _)| i).collect();
        let mut results = Vec::with_capacity(pending.len());
        for idx in pending {
            let Some(proposal) = batch.get(idx).cloned() else {
                continue;
            };
            let outcome = self.apply(&proposal);
            if outcome.is_ok() {
                batch.mark_applied(idx);
            }
            results.push(ApplyResult {
                rel_path: proposal.rel_path,
                outcome,
            });
        }
        results
    }

    /// Runs the configured test command inside the project root after a
    /// successful batch. `None` when no command is configured or writes
    /// are off.
    pub fn run_test_command(&self) -> Option<ExecReport> {
        if !self.admin.writes {
            return None;
        }
        let command = self.test_command.as_deref()?.trim();
        if command.is_empty() {
            return None;
        }
        log::info!("running test command: {command}");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(self.policy.root())
            .output();
        Some(match output {
            Ok(out) => ExecReport {
                command: command.to_string(),
                exit_code: out.status.code(),
                stdout: cap_output(&out.stdout),
                stderr: cap_output(&out.stderr),
                error: None,
            },
            Err(e) => ExecReport {
                command: command.to_string(),
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                error: Some(e.to_string()),
            },
        })
    }

    fn is_exec_target(&self, abs: &Path) -> bool {
        abs.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.exec_extensions
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    fn run_script(&self, abs: &Path) -> ExecReport {
        let interpreter = match abs.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("py") => "python3",
            _ => "sh",
        };
        let command = format!("{interpreter} {}", abs.display());
        let cwd = abs.parent().unwrap_or(self.policy.root());
        log::info!("executing script: {command}");

        match Command::new(interpreter).arg(abs).current_dir(cwd).output() {
            Ok(out) => ExecReport {
                command,
                exit_code: out.status.code(),
                stdout: cap_output(&out.stdout),
                stderr: cap_output(&out.stderr),
                error: None,
            },
            Err(e) => {
                log::warn!("script launch failed for {}: {e}", abs.display());
                ExecReport {
                    command,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

fn cap_output(bytes: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if text.len() > MAX_CAPTURED_OUTPUT {
        let mut cap = MAX_CAPTURED_OUTPUT;
        while cap > 0 && !text.is_char_boundary(cap) {
            cap -= 1;
        }
        text.truncate(cap);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::EditKind;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn fixture(admin: AdminMode) -> (tempfile::TempDir, ChangeApplier, PathPolicy) {
        let temp = tempdir().unwrap();
        let policy = PathPolicy::new(temp.path()).unwrap();
        let mut settings = Settings::for_root(temp.path());
        settings.exec_extensions = vec!["sh".to_string()];
        let mut applier = ChangeApplier::new(policy.clone(), &settings);
        applier.set_admin(admin);
        (temp, applier, policy)
    }

    fn proposal(policy: &PathPolicy, rel: &str, content: &str) -> ChangeProposal {
        let abs = policy.resolve(rel).unwrap();
        let kind = if abs.exists() {
            EditKind::Modify
        } else {
            EditKind::Create
        };
        ChangeProposal {
            rel_path: rel.to_string(),
            abs_path: abs,
            content: content.to_string(),
            kind,
            rationale: None,
        }
    }

    #[test]
    fn apply_denied_without_write_permission() {
        let (temp, applier, policy) = fixture(AdminMode::default());
        fs::write(temp.path().join("a.txt"), "hello").unwrap();
        let p = proposal(&policy, "a.txt", "hello world");

        let err = applier.apply(&p).unwrap_err();
        assert!(matches!(err, ApplyError::PermissionDenied));
        // no partial write happened
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).unwrap(), "hello");
    }

    #[test]
    fn apply_writes_and_creates_parent_directories() {
        let (temp, applier, policy) = fixture(AdminMode {
            writes: true,
            execute: false,
        });
        let p = proposal(&policy, "src/deep/new.rs", "pub fn hi() {}");

        let report = applier.apply(&p).unwrap();
        assert_eq!(report.action, ApplyAction::Created);
        assert!(report.exec.is_none());
        assert_eq!(
            fs::read_to_string(temp.path().join("src/deep/new.rs")).unwrap(),
            "pub fn hi() {}"
        );
    }

    #[test]
    fn apply_modifies_existing_file() {
        let (temp, applier, policy) = fixture(AdminMode {
            writes: true,
            execute: false,
        });
        fs::write(temp.path().join("a.txt"), "hello").unwrap();
        let p = proposal(&policy, "a.txt", "hello world");

        let report = applier.apply(&p).unwrap();
        assert_eq!(report.action, ApplyAction::Modified);
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).unwrap(), "hello world");
    }

    #[test]
    fn write_permission_does_not_imply_execute() {
        let (_temp, applier, policy) = fixture(AdminMode {
            writes: true,
            execute: false,
        });
        let p = proposal(&policy, "run.sh", "echo should-not-run");

        let report = applier.apply(&p).unwrap();
        assert!(report.exec.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn execute_permission_runs_scripts_and_captures_output() {
        let (_temp, applier, policy) = fixture(AdminMode {
            writes: true,
            execute: true,
        });
        let p = proposal(&policy, "run.sh", "echo hi from script");

        let report = applier.apply(&p).unwrap();
        let exec = report.exec.expect("exec report");
        assert_eq!(exec.exit_code, Some(0));
        assert!(exec.stdout.contains("hi from script"));
        assert!(exec.error.is_none());
    }

    #[test]
    fn apply_report_serializes_with_snake_case_action() {
        let report = ApplyReport {
            rel_path: "src/new.rs".to_string(),
            action: ApplyAction::Created,
            exec: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["rel_path"], "src/new.rs");
        assert_eq!(json["action"], "created");
        assert!(json["exec"].is_null());
    }

    #[test]
    fn apply_all_is_independent_per_proposal() {
        let (temp, applier, policy) = fixture(AdminMode {
            writes: true,
            execute: false,
        });
        let good = proposal(&policy, "ok.txt", "fine");
        // a proposal whose target escaped between parse and apply
        let bad = ChangeProposal {
            rel_path: "../escape.txt".to_string(),
            abs_path: temp.path().join("../escape.txt"),
            content: "nope".to_string(),
            kind: EditKind::Create,
            rationale: None,
        };

        let mut batch = ProposalBatch::new(vec![bad, good]);
        let results = applier.apply_all(&mut batch);

        assert_eq!(results.len(), 2);
        assert!(results[0].outcome.is_err());
        assert!(results[1].outcome.is_ok());
        assert!(temp.path().join("ok.txt").exists());
        assert_eq!(batch.state(1), Some(crate::ProposalState::Applied));
        // the failed one stays pending for the caller to resolve
        assert_eq!(batch.state(0), Some(crate::ProposalState::Pending));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_runs_in_project_root() {
        let temp = tempdir().unwrap();
        let policy = PathPolicy::new(temp.path()).unwrap();
        let mut settings = Settings::for_root(temp.path());
        settings.test_command = Some("echo test-ran".to_string());
        let mut applier = ChangeApplier::new(policy, &settings);

        // writes off: the test step is skipped entirely
        assert!(applier.run_test_command().is_none());

        applier.set_admin(AdminMode {
            writes: true,
            execute: false,
        });
        let report = applier.run_test_command().expect("report");
        assert_eq!(report.exit_code, Some(0));
        assert!(report.stdout.contains("test-ran"));
    }
}
