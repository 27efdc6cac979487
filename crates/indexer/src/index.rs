use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use patchpilot_protocol::PathPolicy;
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, ReadError, Result};
use crate::scanner::FileScanner;
use crate::stats::ScanStats;

/// Detected content kind of an indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Binary,
}

/// One regular file in the current index snapshot.
///
/// Identity is the forward-slash, root-relative path; entries are replaced
/// wholesale on every scan, never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub size_bytes: u64,
    pub modified_ms: u64,
    pub kind: ContentKind,
}

/// Text read from an indexed file, possibly truncated to a byte cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub text: String,
    pub truncated: bool,
}

/// Snapshot of the project tree: relative path → file metadata.
///
/// Mutated only by its own scan; a failed rescan leaves the prior snapshot
/// in place so callers never observe a partially-populated index.
pub struct ProjectIndex {
    root: PathBuf,
    ignore_patterns: Vec<String>,
    files: BTreeMap<String, IndexedFile>,
    scanned_at_ms: u64,
    last_stats: ScanStats,
}

impl ProjectIndex {
    /// Walks the policy's root and builds the initial snapshot.
    pub fn scan(policy: &PathPolicy, ignore_patterns: &[String]) -> Result<Self> {
        let root = policy.root().to_path_buf();
        let (files, stats) = scan_tree(&root, ignore_patterns)?;
        Ok(Self {
            root,
            ignore_patterns: ignore_patterns.to_vec(),
            files,
            scanned_at_ms: now_ms(),
            last_stats: stats,
        })
    }

    /// Re-runs the scan with the configured root and swaps the snapshot in
    /// one step. On failure the previous snapshot is kept.
    pub fn reindex(&mut self) -> Result<&ScanStats> {
        let (files, stats) = scan_tree(&self.root, &self.ignore_patterns)?;
        self.files = files;
        self.last_stats = stats;
        self.scanned_at_ms = now_ms();
        log::info!("reindexed {}: {} files", self.root.display(), self.files.len());
        Ok(&self.last_stats)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scanned_at_ms(&self) -> u64 {
        self.scanned_at_ms
    }

    pub fn stats(&self) -> &ScanStats {
        &self.last_stats
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, rel_path: &str) -> Option<&IndexedFile> {
        self.files.get(rel_path)
    }

    pub fn contains(&self, rel_path: &str) -> bool {
        self.files.contains_key(rel_path)
    }

    /// Iterates entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = &IndexedFile> {
        self.files.values()
    }

    /// Case-insensitive substring search over relative paths. Lazy and
    /// restartable; yields entries in path order.
    pub fn find<'a>(&'a self, substring: &str) -> impl Iterator<Item = &'a IndexedFile> + 'a {
        let needle = substring.to_lowercase();
        self.files
            .values()
            .filter(move |f| !needle.is_empty() && f.rel_path.to_lowercase().contains(&needle))
    }

    /// True when `rel_path` names a directory that contains indexed files.
    /// The empty string names the project root.
    pub fn is_indexed_dir(&self, rel_path: &str) -> bool {
        if rel_path.is_empty() {
            return !self.files.is_empty();
        }
        let prefix = format!("{rel_path}/");
        self.files.keys().any(|k| k.starts_with(&prefix))
    }

    /// Files directly inside `rel_path` (no recursion into subdirectories,
    /// matching the directory-pin contract).
    pub fn files_under(&self, rel_path: &str) -> Vec<&IndexedFile> {
        let prefix = if rel_path.is_empty() {
            String::new()
        } else {
            format!("{rel_path}/")
        };
        self.files
            .iter()
            .filter(|(k, _)| {
                k.starts_with(&prefix) && !k[prefix.len()..].contains('/')
            })
            .map(|(_, f)| f)
            .collect()
    }

    /// Renders the indented project tree included in prompts.
    pub fn tree(&self) -> String {
        let mut trie = DirNode::default();
        for rel_path in self.files.keys() {
            trie.insert(rel_path);
        }
        let root_name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string());
        let mut out = format!("{root_name}/");
        trie.render(&mut out, 1);
        out
    }

    /// Reads a pinned file's current bytes at call time, capped to
    /// `max_bytes` (on a character boundary). Missing or unreadable files
    /// fail per-file without invalidating the snapshot.
    pub fn read_content(&self, rel_path: &str, max_bytes: usize) -> std::result::Result<FileContent, ReadError> {
        let entry = self
            .files
            .get(rel_path)
            .ok_or_else(|| ReadError::NotIndexed(rel_path.to_string()))?;
        if entry.kind == ContentKind::Binary {
            return Err(ReadError::Binary(rel_path.to_string()));
        }

        let mut bytes = Vec::new();
        std::fs::File::open(&entry.abs_path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .map_err(|source| ReadError::Io {
                path: rel_path.to_string(),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        let truncated = text.len() > max_bytes;
        if truncated {
            let mut cap = max_bytes;
            while cap > 0 && !text.is_char_boundary(cap) {
                cap -= 1;
            }
            text.truncate(cap);
            log::debug!(
                "content of '{rel_path}' truncated to {cap} bytes (cap {max_bytes})"
            );
        }
        Ok(FileContent { text, truncated })
    }
}

fn scan_tree(
    root: &Path,
    ignore_patterns: &[String],
) -> Result<(BTreeMap<String, IndexedFile>, ScanStats)> {
    if !root.is_dir() {
        return Err(IndexError::InvalidRoot(root.display().to_string()));
    }
    let scanner = FileScanner::new(root, ignore_patterns);
    let (scanned, stats) = scanner.scan();
    let mut files = BTreeMap::new();
    for file in scanned {
        let Ok(rel) = file.abs_path.strip_prefix(root) else {
            continue;
        };
        let rel_path = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.insert(
            rel_path.clone(),
            IndexedFile {
                rel_path,
                abs_path: file.abs_path,
                size_bytes: file.size_bytes,
                modified_ms: file.modified_ms,
                kind: file.kind,
            },
        );
    }
    Ok((files, stats))
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Default)]
struct DirNode {
    dirs: BTreeMap<String, DirNode>,
    files: Vec<String>,
}

impl DirNode {
    fn insert(&mut self, rel_path: &str) {
        match rel_path.split_once('/') {
            Some((dir, rest)) => self
                .dirs
                .entry(dir.to_string())
                .or_default()
                .insert(rest),
            None => self.files.push(rel_path.to_string()),
        }
    }

    fn render(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        for (name, node) in &self.dirs {
            out.push_str(&format!("\n{indent}{name}/"));
            node.render(out, depth + 1);
        }
        for name in &self.files {
            out.push_str(&format!("\n{indent}{name}"));
        }
    }
}
