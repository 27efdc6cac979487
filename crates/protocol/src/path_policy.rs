use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("path '{0}' resolves outside the project root")]
    Violation(String),

    #[error("project root '{0}' does not exist or is not a directory")]
    InvalidRoot(String),

    #[error("failed to resolve '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Confines every user- or model-supplied path to the configured project
/// root. Must be consulted before any read, write, or existence check that
/// originates outside the engine itself.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    root: PathBuf,
}

impl PathPolicy {
    /// Builds a policy around a canonicalized project root.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, PathError> {
        let raw = root.as_ref();
        let root = raw
            .canonicalize()
            .map_err(|_| PathError::InvalidRoot(raw.display().to_string()))?;
        if !root.is_dir() {
            return Err(PathError::InvalidRoot(root.display().to_string()));
        }
        Ok(Self { root })
    }

    /// The canonical project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a raw path (relative or absolute, possibly quoted, possibly
    /// with `.`/`..` segments) to a normalized absolute path, failing with
    /// [`PathError::Violation`] when the result would leave the root.
    ///
    /// The target is allowed to not exist yet; symlinks along the existing
    /// portion of the path are followed so a link cannot smuggle the result
    /// outside the root.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, PathError> {
        let cleaned = clean_input(raw);
        if cleaned.is_empty() {
            return Err(PathError::Violation(raw.to_string()));
        }

        let candidate = Path::new(&cleaned);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let normalized =
            normalize_lexically(&joined).ok_or_else(|| PathError::Violation(raw.to_string()))?;
        if !normalized.starts_with(&self.root) {
            return Err(PathError::Violation(raw.to_string()));
        }

        // Symlink hardening: canonicalize the deepest existing ancestor and
        // re-check containment before re-attaching the missing tail.
        let (existing, tail) = split_existing(&normalized);
        let canonical = existing.canonicalize().map_err(|source| PathError::Io {
            path: existing.display().to_string(),
            source,
        })?;
        if !canonical.starts_with(&self.root) {
            return Err(PathError::Violation(raw.to_string()));
        }

        Ok(canonical.join(tail))
    }

    /// Forward-slash, root-relative form of an already-resolved path.
    pub fn relativize(&self, abs: &Path) -> Result<String, PathError> {
        let rel = abs
            .strip_prefix(&self.root)
            .map_err(|_| PathError::Violation(abs.display().to_string()))?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(parts.join("/"))
    }

    /// True when `abs` lies inside the root (the root itself counts).
    pub fn is_within(&self, abs: &Path) -> bool {
        abs.starts_with(&self.root)
    }
}

fn clean_input(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '\'' || c == '"' || c == '`')
        .replace('\\', "/")
}

/// Resolves `.` and `..` without touching the filesystem. Returns `None`
/// when `..` would climb past the path's own prefix.
fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(name) => {
                out.push(name);
                depth += 1;
            }
        }
    }
    Some(out)
}

/// Splits a normalized path into its deepest existing ancestor and the
/// not-yet-created remainder.
fn split_existing(path: &Path) -> (PathBuf, PathBuf) {
    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                tail.push(name.to_os_string());
                existing.pop();
            }
            None => break,
        }
    }
    let mut rest = PathBuf::new();
    for name in tail.into_iter().rev() {
        rest.push(name);
    }
    (existing, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn policy(root: &Path) -> PathPolicy {
        PathPolicy::new(root).expect("policy")
    }

    #[test]
    fn resolves_relative_paths_inside_root() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "hi").unwrap();
        let policy = policy(temp.path());

        let resolved = policy.resolve("a.txt").unwrap();
        assert!(policy.is_within(&resolved));
        assert_eq!(policy.relativize(&resolved).unwrap(), "a.txt");
    }

    #[test]
    fn resolves_nested_paths_that_do_not_exist_yet() {
        let temp = tempdir().unwrap();
        let policy = policy(temp.path());

        let resolved = policy.resolve("src/new/mod.rs").unwrap();
        assert!(policy.is_within(&resolved));
        assert_eq!(policy.relativize(&resolved).unwrap(), "src/new/mod.rs");
    }

    #[test]
    fn rejects_parent_escape() {
        let temp = tempdir().unwrap();
        let policy = policy(temp.path());

        let err = policy.resolve("../outside.txt").unwrap_err();
        assert!(matches!(err, PathError::Violation(_)));

        let err = policy.resolve("a/../../outside.txt").unwrap_err();
        assert!(matches!(err, PathError::Violation(_)));
    }

    #[test]
    fn dot_segments_inside_root_are_fine() {
        let temp = tempdir().unwrap();
        let policy = policy(temp.path());

        let resolved = policy.resolve("./src/../src/lib.rs").unwrap();
        assert_eq!(policy.relativize(&resolved).unwrap(), "src/lib.rs");
    }

    #[test]
    fn rejects_absolute_paths_outside_root() {
        let temp = tempdir().unwrap();
        let other = tempdir().unwrap();
        let policy = policy(temp.path());

        let raw = other.path().join("x.txt");
        let err = policy.resolve(&raw.to_string_lossy()).unwrap_err();
        assert!(matches!(err, PathError::Violation(_)));
    }

    #[test]
    fn accepts_absolute_paths_inside_root() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "hi").unwrap();
        let policy = policy(temp.path());

        let raw = policy.root().join("a.txt");
        let resolved = policy.resolve(&raw.to_string_lossy()).unwrap();
        assert_eq!(policy.relativize(&resolved).unwrap(), "a.txt");
    }

    #[test]
    fn strips_quotes_from_model_supplied_paths() {
        let temp = tempdir().unwrap();
        let policy = policy(temp.path());

        let resolved = policy.resolve("'src/main.rs'").unwrap();
        assert_eq!(policy.relativize(&resolved).unwrap(), "src/main.rs");
    }

    #[test]
    fn empty_input_is_a_violation() {
        let temp = tempdir().unwrap();
        let policy = policy(temp.path());
        assert!(matches!(
            policy.resolve("   "),
            Err(PathError::Violation(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_a_violation() {
        let temp = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let link = temp.path().join("link");
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();
        let policy = policy(temp.path());

        let err = policy.resolve("link/escape.txt").unwrap_err();
        assert!(matches!(err, PathError::Violation(_)));
    }

    #[test]
    fn missing_root_is_invalid() {
        let temp = tempdir().unwrap();
        let gone = temp.path().join("nope");
        assert!(matches!(
            PathPolicy::new(&gone),
            Err(PathError::InvalidRoot(_))
        ));
    }
}
