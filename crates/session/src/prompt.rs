//! Prompt assembly: the fixed system header, the project tree, one
//! fenced block per materialized context file, then the user turn.

use std::path::Path;

use patchpilot_context::Materialized;
use patchpilot_proposal::AdminMode;
use patchpilot_protocol::PromptTurn;

pub(crate) fn assemble(
    root: &Path,
    admin: AdminMode,
    tree: &str,
    materialized: &Materialized,
    user_text: &str,
) -> Vec<PromptTurn> {
    let mut turns = Vec::with_capacity(materialized.entries.len() + 3);

    let writes = if admin.writes { "enabled" } else { "disabled" };
    turns.push(PromptTurn::system(format!(
        "You are a coding assistant working on the project at '{}'.\n\
         When you propose a file change, reply with the complete new file \
         content, preceded by a line of the form `# FILEPATH: relative/path` \
         and wrapped in a fenced code block. One block per file.\n\
         File writes are currently {writes}.",
        root.display()
    )));

    if !tree.is_empty() {
        turns.push(PromptTurn::system(format!("Project tree:\n{tree}")));
    }

    for entry in &materialized.entries {
        let note = if entry.truncated { " (truncated)" } else { "" };
        turns.push(PromptTurn::system(format!(
            "# FILEPATH: {}{note}\n```\n{}\n```",
            entry.rel_path, entry.text
        )));
    }

    turns.push(PromptTurn::user(user_text));
    turns
}
