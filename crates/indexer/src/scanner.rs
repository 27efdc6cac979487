use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ignore::WalkBuilder;

use crate::index::ContentKind;
use crate::stats::ScanStats;

/// Files larger than this are left out of the index entirely.
pub const MAX_INDEXED_FILE_BYTES: u64 = 1_048_576; // 1 MiB

/// Bytes sniffed from the head of a file to classify text vs binary.
const SNIFF_BYTES: usize = 8_192;

/// One regular file found by a scan pass.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub abs_path: PathBuf,
    pub size_bytes: u64,
    pub modified_ms: u64,
    pub kind: ContentKind,
}

/// Scanner for regular files in a project tree (.gitignore aware),
/// pruning configured ignore patterns on top of the git rules.
pub struct FileScanner {
    root: PathBuf,
    dir_names: Vec<String>,
    globs: Vec<glob::Pattern>,
}

impl FileScanner {
    /// Builds a scanner over `root`. Patterns containing a glob
    /// metacharacter match file names; plain patterns match any path
    /// component (directory pruning). Unparsable globs are logged and
    /// treated as plain names.
    pub fn new(root: impl AsRef<Path>, ignore_patterns: &[String]) -> Self {
        let mut dir_names = Vec::new();
        let mut globs = Vec::new();
        for pattern in ignore_patterns {
            if pattern.contains(['*', '?', '[']) {
                match glob::Pattern::new(pattern) {
                    Ok(compiled) => globs.push(compiled),
                    Err(e) => {
                        log::warn!("ignoring unparsable ignore pattern '{pattern}': {e}");
                        dir_names.push(pattern.clone());
                    }
                }
            } else {
                dir_names.push(pattern.clone());
            }
        }
        Self {
            root: root.as_ref().to_path_buf(),
            dir_names,
            globs,
        }
    }

    /// Walks the tree and returns every indexable file plus scan statistics.
    pub fn scan(&self) -> (Vec<ScannedFile>, ScanStats) {
        let mut files = Vec::new();
        let mut stats = ScanStats::default();
        let started = std::time::Instant::now();

        let root = self.root.clone();
        let dir_names = self.dir_names.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(true) // do not index hidden files by default
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false);
        builder.filter_entry(move |entry| !is_pruned_scope(entry.path(), &root, &dir_names));

        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("failed to read entry: {e}");
                    stats.add_error(e.to_string());
                    continue;
                }
            };
            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }

            let path = entry.path();
            if self.matches_glob(path) {
                log::debug!("skipping ignored file {}", path.display());
                continue;
            }

            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    log::warn!("could not stat {} during scan: {e}", path.display());
                    stats.add_error(format!("{}: {e}", path.display()));
                    continue;
                }
            };
            if meta.len() > MAX_INDEXED_FILE_BYTES {
                log::debug!(
                    "skipping large file {} ({} bytes > {})",
                    path.display(),
                    meta.len(),
                    MAX_INDEXED_FILE_BYTES
                );
                stats.skipped_large += 1;
                continue;
            }

            let modified_ms = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);

            let kind = sniff_kind(path);
            stats.add_file(meta.len());
            files.push(ScannedFile {
                abs_path: path.to_path_buf(),
                size_bytes: meta.len(),
                modified_ms,
                kind,
            });
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "scan of {} found {} files ({} bytes) in {} ms",
            self.root.display(),
            stats.files,
            stats.total_bytes,
            stats.duration_ms
        );
        (files, stats)
    }

    fn matches_glob(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.globs.iter().any(|p| p.matches(name))
    }
}

fn is_pruned_scope(path: &Path, root: &Path, dir_names: &[String]) -> bool {
    if let Ok(relative) = path.strip_prefix(root) {
        for component in relative.components() {
            if let std::path::Component::Normal(name) = component {
                let name = name.to_string_lossy();
                if dir_names.iter().any(|ignored| ignored == name.as_ref()) {
                    return true;
                }
            }
        }
    }
    false
}

/// NUL-byte sniff of the file head. Unreadable files are classified as
/// binary so later text reads fail loudly instead of mangling bytes.
fn sniff_kind(path: &Path) -> ContentKind {
    let mut head = [0u8; SNIFF_BYTES];
    match std::fs::File::open(path).and_then(|mut f| f.read(&mut head)) {
        Ok(n) => {
            if head[..n].contains(&0) {
                ContentKind::Binary
            } else {
                ContentKind::Text
            }
        }
        Err(_) => ContentKind::Binary,
    }
}
