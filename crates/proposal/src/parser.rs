use std::path::PathBuf;
use std::sync::OnceLock;

use patchpilot_protocol::PathPolicy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Whether applying a proposal creates a file or rewrites an existing one.
/// Decided at parse time from the live filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    Create,
    Modify,
}

/// One intended file edit extracted from a model response. Content is the
/// full proposed file body, never null (an empty file is an empty string).
#[derive(Debug, Clone)]
pub struct ChangeProposal {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub content: String,
    pub kind: EditKind,
    /// Prose immediately preceding the annotation in the reply, if any.
    pub rationale: Option<String>,
}

/// A block that could not become a proposal. Recorded, never fatal to the
/// remaining blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// A `# FILEPATH:` annotation with an empty path.
    EmptyPath { block: usize },
    /// The annotated path failed policy resolution.
    InvalidPath {
        block: usize,
        path: String,
        reason: String,
    },
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseWarning::EmptyPath { block } => {
                write!(f, "block {block}: empty filepath annotation")
            }
            ParseWarning::InvalidPath {
                block,
                path,
                reason,
            } => write!(f, "block {block}: rejected path '{path}': {reason}"),
        }
    }
}

/// Parsed view of a model response: zero or more proposals plus warnings
/// for blocks that were dropped. Zero proposals is a normal outcome for a
/// purely conversational reply.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub proposals: Vec<ChangeProposal>,
    pub warnings: Vec<ParseWarning>,
}

impl ParseOutcome {
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }
}

/// Extracts `# FILEPATH:`-annotated fenced blocks from a model response.
///
/// Blocks without a recognizable annotation are conversational text and are
/// simply not proposals; malformed annotations are dropped with a warning.
pub struct ProposalParser<'a> {
    policy: &'a PathPolicy,
}

fn block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // An annotation line, an optional opening fence, then everything up
        // to the closing fence or end of input.
        Regex::new(r"(?s)#\s*FILEPATH\s*:\s*([^\n`]+?)\s*\n(?:```[\w.+-]*\n)?(.*?)(?:\n```|\z)")
            .unwrap_or_else(|e| unreachable!("proposal block regex is well-formed: {e}"))
    })
}

impl<'a> ProposalParser<'a> {
    pub fn new(policy: &'a PathPolicy) -> Self {
        Self { policy }
    }

    pub fn parse(&self, response: &str) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();

        // Offset of the end of the previous block; the text in between is
        // the model's commentary for the next one.
        let mut cursor = 0usize;
        for (block, captures) in block_regex().captures_iter(response).enumerate() {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let prose = response[cursor..whole.start()].trim();
            cursor = whole.end();
            let rationale = (!prose.is_empty()).then(|| prose.to_string());

            let raw_path = captures
                .get(1)
                .map(|m| m.as_str())
                .unwrap_or_default()
                .trim()
                .trim_matches(|c| c == '\'' || c == '"' || c == '`')
                .replace('\\', "/");
            if raw_path.is_empty() {
                log::warn!("empty filepath annotation in response block {block}");
                outcome.warnings.push(ParseWarning::EmptyPath { block });
                continue;
            }

            let abs_path = match self.policy.resolve(&raw_path) {
                Ok(abs) => abs,
                Err(e) => {
                    log::warn!("dropping proposal for '{raw_path}': {e}");
                    outcome.warnings.push(ParseWarning::InvalidPath {
                        block,
                        path: raw_path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let rel_path = match self.policy.relativize(&abs_path) {
                Ok(rel) => rel,
                Err(e) => {
                    outcome.warnings.push(ParseWarning::InvalidPath {
                        block,
                        path: raw_path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let content = normalize_content(captures.get(2).map(|m| m.as_str()).unwrap_or(""));
            let kind = if abs_path.exists() {
                EditKind::Modify
            } else {
                EditKind::Create
            };
            log::info!(
                "parsed {} proposal for '{rel_path}' ({} bytes)",
                match kind {
                    EditKind::Create => "create",
                    EditKind::Modify => "modify",
                },
                content.len()
            );
            outcome.proposals.push(ChangeProposal {
                rel_path,
                abs_path,
                content,
                kind,
                rationale,
            });
        }

        outcome
    }
}

/// Strips a straggling closing fence (when the match ran to end of input)
/// and normalizes line endings to `\n`.
fn normalize_content(raw: &str) -> String {
    let mut content = raw;
    if let Some(stripped) = content.strip_suffix("\n```") {
        content = stripped;
    } else if let Some(stripped) = content.strip_suffix("```") {
        content = stripped;
    }
    content.trim().replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn fixture() -> (tempfile::TempDir, PathPolicy) {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "hello").unwrap();
        let policy = PathPolicy::new(temp.path()).unwrap();
        (temp, policy)
    }

    #[test]
    fn parses_a_single_annotated_block() {
        let (_temp, policy) = fixture();
        let parser = ProposalParser::new(&policy);

        let response = "Here is the fix:\n\
            # FILEPATH: a.txt\n\
            ```\n\
            hello world\n\
            ```\n\
            Let me know what you think.";
        let outcome = parser.parse(response);

        assert_eq!(outcome.proposals.len(), 1);
        assert!(outcome.warnings.is_empty());
        let proposal = &outcome.proposals[0];
        assert_eq!(proposal.rel_path, "a.txt");
        assert_eq!(proposal.content, "hello world");
        assert_eq!(proposal.kind, EditKind::Modify);
    }

    #[test]
    fn create_kind_for_files_missing_on_disk() {
        let (_temp, policy) = fixture();
        let parser = ProposalParser::new(&policy);

        let response = "# FILEPATH: src/new_module.rs\n```rust\npub fn hi() {}\n```";
        let outcome = parser.parse(response);

        assert_eq!(outcome.proposals.len(), 1);
        assert_eq!(outcome.proposals[0].kind, EditKind::Create);
        assert_eq!(outcome.proposals[0].rel_path, "src/new_module.rs");
    }

    #[test]
    fn multiple_blocks_in_order() {
        let (_temp, policy) = fixture();
        let parser = ProposalParser::new(&policy);

        let response = "# FILEPATH: one.txt\n```\nfirst\n```\n\n\
            some commentary between blocks\n\n\
            # FILEPATH: two.txt\n```\nsecond\n```";
        let outcome = parser.parse(response);

        let paths: Vec<_> = outcome
            .proposals
            .iter()
            .map(|p| p.rel_path.clone())
            .collect();
        assert_eq!(paths, vec!["one.txt", "two.txt"]);
        assert_eq!(outcome.proposals[1].content, "second");
    }

    #[test]
    fn prose_before_a_block_becomes_its_rationale() {
        let (_temp, policy) = fixture();
        let parser = ProposalParser::new(&policy);

        let response = "I inlined the greeting.\n\n\
            # FILEPATH: a.txt\n```\nhello world\n```\n\
            And a second file for the tests:\n\n\
            # FILEPATH: b.txt\n```\nbeta\n```";
        let outcome = parser.parse(response);

        assert_eq!(outcome.proposals.len(), 2);
        assert_eq!(
            outcome.proposals[0].rationale.as_deref(),
            Some("I inlined the greeting.")
        );
        assert_eq!(
            outcome.proposals[1].rationale.as_deref(),
            Some("And a second file for the tests:")
        );
    }

    #[test]
    fn block_without_preceding_prose_has_no_rationale() {
        let (_temp, policy) = fixture();
        let parser = ProposalParser::new(&policy);

        let outcome = parser.parse("# FILEPATH: a.txt\n```\nx\n```");
        assert_eq!(outcome.proposals.len(), 1);
        assert_eq!(outcome.proposals[0].rationale, None);
    }

    #[test]
    fn response_without_blocks_yields_no_proposals() {
        let (_temp, policy) = fixture();
        let parser = ProposalParser::new(&policy);

        let outcome = parser.parse("Just a conversational answer with no code.");
        assert!(outcome.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn plain_fenced_block_without_annotation_is_not_a_proposal() {
        let (_temp, policy) = fixture();
        let parser = ProposalParser::new(&policy);

        let outcome = parser.parse("Example:\n```\nlet x = 1;\n```\n");
        assert!(outcome.is_empty());
    }

    #[test]
    fn escaping_path_is_dropped_with_warning_and_parsing_continues() {
        let (_temp, policy) = fixture();
        let parser = ProposalParser::new(&policy);

        let response = "# FILEPATH: ../../etc/passwd\n```\npwned\n```\n\
            # FILEPATH: safe.txt\n```\nok\n```";
        let outcome = parser.parse(response);

        assert_eq!(outcome.proposals.len(), 1);
        assert_eq!(outcome.proposals[0].rel_path, "safe.txt");
        assert_eq!(outcome.warnings.len(), 1);
        assert!(matches!(
            outcome.warnings[0],
            ParseWarning::InvalidPath { block: 0, .. }
        ));
    }

    #[test]
    fn unterminated_fence_runs_to_end_of_input() {
        let (_temp, policy) = fixture();
        let parser = ProposalParser::new(&policy);

        let response = "# FILEPATH: a.txt\n```\nline one\nline two";
        let outcome = parser.parse(response);

        assert_eq!(outcome.proposals.len(), 1);
        assert_eq!(outcome.proposals[0].content, "line one\nline two");
    }

    #[test]
    fn quoted_paths_and_crlf_content_are_normalized() {
        let (_temp, policy) = fixture();
        let parser = ProposalParser::new(&policy);

        let response = "# FILEPATH: 'b.txt'\n```\nalpha\r\nbeta\r\n```";
        let outcome = parser.parse(response);

        assert_eq!(outcome.proposals.len(), 1);
        assert_eq!(outcome.proposals[0].rel_path, "b.txt");
        assert_eq!(outcome.proposals[0].content, "alpha\nbeta");
    }
}
