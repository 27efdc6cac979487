//! The pinned working set of project files included in model prompts.
//!
//! A [`ContextSet`] references index entries by relative path, never by
//! content: reads happen at materialize time so edits made outside the
//! tool between pin and use are always reflected.

use patchpilot_indexer::{ProjectIndex, ReadError};
use patchpilot_protocol::{PathError, PathPolicy};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContextError>;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("'{0}' is not in the project index")]
    NotFound(String),

    #[error("path error: {0}")]
    Path(#[from] PathError),
}

/// One pinned file's content, read at materialize time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub rel_path: String,
    pub text: String,
    pub truncated: bool,
}

/// A pinned file that could not be read. Reported, never fatal to the
/// rest of the batch.
#[derive(Debug)]
pub struct MaterializeFailure {
    pub rel_path: String,
    pub error: ReadError,
}

/// Result of materializing the pinned set against the live filesystem.
///
/// `dropped` lists the least-recently-pinned files removed to fit the byte
/// budget; a non-empty list is the overflow signal, the remaining payload
/// is still usable.
#[derive(Debug, Default)]
pub struct Materialized {
    pub entries: Vec<ContextEntry>,
    pub failures: Vec<MaterializeFailure>,
    pub dropped: Vec<String>,
    pub total_bytes: usize,
}

impl Materialized {
    pub fn overflowed(&self) -> bool {
        !self.dropped.is_empty()
    }
}

/// Ordered set of pinned relative paths, oldest pin first.
#[derive(Debug, Default)]
pub struct ContextSet {
    pinned: Vec<String>,
}

impl ContextSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pinned paths in pin order (least recently pinned first).
    pub fn pinned(&self) -> &[String] {
        &self.pinned
    }

    pub fn is_pinned(&self, rel_path: &str) -> bool {
        self.pinned.iter().any(|p| p == rel_path)
    }

    pub fn len(&self) -> usize {
        self.pinned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }

    /// Pins a file, or every indexed file directly inside a directory.
    /// Validation runs before any mutation, so a failing path pins
    /// nothing. Returns the newly pinned paths (already-pinned entries
    /// are skipped silently).
    pub fn pin(
        &mut self,
        raw: &str,
        index: &ProjectIndex,
        policy: &PathPolicy,
    ) -> Result<Vec<String>> {
        let abs = policy.resolve(raw)?;
        let rel = policy.relativize(&abs)?;

        let candidates: Vec<String> = if index.contains(&rel) {
            vec![rel]
        } else if index.is_indexed_dir(&rel) {
            index
                .files_under(&rel)
                .into_iter()
                .map(|f| f.rel_path.clone())
                .collect()
        } else {
            return Err(ContextError::NotFound(raw.to_string()));
        };

        let mut added = Vec::new();
        for rel_path in candidates {
            if !self.is_pinned(&rel_path) {
                log::info!("pinned '{rel_path}'");
                self.pinned.push(rel_path.clone());
                added.push(rel_path);
            }
        }
        Ok(added)
    }

    /// Unpins one path. Removing a path that is not pinned is a no-op,
    /// not an error.
    pub fn unpin(&mut self, raw: &str, policy: &PathPolicy) -> Option<String> {
        let rel = policy
            .resolve(raw)
            .and_then(|abs| policy.relativize(&abs))
            .unwrap_or_else(|_| raw.trim().replace('\\', "/"));
        let pos = self.pinned.iter().position(|p| *p == rel)?;
        self.pinned.remove(pos);
        log::info!("unpinned '{rel}'");
        Some(rel)
    }

    /// Clears the set, returning how many paths were pinned.
    pub fn unpin_all(&mut self) -> usize {
        let count = self.pinned.len();
        self.pinned.clear();
        count
    }

    /// Reads every pinned file's current bytes, capping each entry at
    /// `per_file_cap` and the whole payload at `budget_bytes`. Per-file
    /// read failures are collected and the rest of the batch continues;
    /// over-budget payloads drop the least-recently-pinned entries first.
    pub fn materialize(
        &self,
        index: &ProjectIndex,
        budget_bytes: usize,
        per_file_cap: usize,
    ) -> Materialized {
        let mut out = Materialized::default();

        for rel_path in &self.pinned {
            match index.read_content(rel_path, per_file_cap) {
                Ok(content) => {
                    out.total_bytes += content.text.len();
                    out.entries.push(ContextEntry {
                        rel_path: rel_path.clone(),
                        text: content.text,
                        truncated: content.truncated,
                    });
                }
                Err(error) => {
                    log::warn!("could not materialize '{rel_path}': {error}");
                    out.failures.push(MaterializeFailure {
                        rel_path: rel_path.clone(),
                        error,
                    });
                }
            }
        }

        // Budget enforcement: evict oldest pins until the payload fits.
        while out.total_bytes > budget_bytes && out.entries.len() > 1 {
            let evicted = out.entries.remove(0);
            out.total_bytes -= evicted.text.len();
            log::warn!(
                "context budget exceeded, dropping least-recently-pinned '{}'",
                evicted.rel_path
            );
            out.dropped.push(evicted.rel_path);
        }
        if out.total_bytes > budget_bytes {
            if let Some(last) = out.entries.last_mut() {
                let mut cap = budget_bytes;
                while cap > 0 && !last.text.is_char_boundary(cap) {
                    cap -= 1;
                }
                out.total_bytes -= last.text.len() - cap;
                last.text.truncate(cap);
                last.truncated = true;
                log::warn!(
                    "'{}' alone exceeds the context budget, truncated to {cap} bytes",
                    last.rel_path
                );
            }
        }

        out
    }
}
