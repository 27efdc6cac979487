use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Directory and file patterns excluded from indexing when the user does
/// not override them. Plain names match path components, `*`-patterns
/// match file names.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // VCS / tooling
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    // caches / builds
    "__pycache__",
    "node_modules",
    "target",
    "build",
    "dist",
    ".cache",
    // environments
    "venv",
    ".venv",
    "env",
    "ENV",
    // junk files
    ".DS_Store",
    "*.pyc",
    "*.swp",
    "*.swo",
    "*.log",
    "*.tmp",
    "*.bak",
    "*~",
    "*.o",
    "*.obj",
    "*.so",
    "*.dll",
    "*.dylib",
];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Read-only session configuration. Loaded once at startup; the engine
/// never writes it back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Directory boundary every resolved path must stay within.
    pub project_root: PathBuf,

    /// Patterns excluded from the index on top of gitignore rules.
    pub ignore_patterns: Vec<String>,

    /// Upper bound on the total bytes of file content in one prompt.
    pub context_budget_bytes: usize,

    /// Per-file cap when materializing context; longer files are truncated.
    pub max_pinned_file_bytes: usize,

    /// Whether the applier may write to disk before the user toggles it.
    pub admin_writes: bool,

    /// Whether the applier may execute written scripts. Separate from
    /// `admin_writes`; neither implies the other.
    pub admin_execute: bool,

    /// File extensions treated as executable scripts by the applier.
    pub exec_extensions: Vec<String>,

    /// Command run inside the project root after a successful apply batch,
    /// when writes are enabled. `None` disables the step.
    pub test_command: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            context_budget_bytes: 50_000,
            max_pinned_file_bytes: 10_000,
            admin_writes: false,
            admin_execute: false,
            exec_extensions: vec!["py".to_string(), "sh".to_string()],
            test_command: None,
        }
    }
}

impl Settings {
    /// Default settings rooted at `root`.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: root.into(),
            ..Self::default()
        }
    }

    /// Loads settings from a TOML file; missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!(
            "loaded settings from {} (root: {})",
            path.display(),
            settings.project_root.display()
        );
        Ok(settings)
    }

    /// True when `ext` (lowercased, no dot) names an executable script.
    pub fn is_exec_extension(&self, ext: &str) -> bool {
        self.exec_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_safe() {
        let settings = Settings::default();
        assert!(!settings.admin_writes);
        assert!(!settings.admin_execute);
        assert!(settings.test_command.is_none());
        assert!(settings.ignore_patterns.iter().any(|p| p == ".git"));
    }

    #[test]
    fn load_merges_missing_keys_with_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("patchpilot.toml");
        std::fs::write(
            &path,
            "project_root = \"/tmp/proj\"\ncontext_budget_bytes = 1234\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.project_root, PathBuf::from("/tmp/proj"));
        assert_eq!(settings.context_budget_bytes, 1234);
        assert_eq!(
            settings.max_pinned_file_bytes,
            Settings::default().max_pinned_file_bytes
        );
    }

    #[test]
    fn load_reports_parse_errors() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("patchpilot.toml");
        std::fs::write(&path, "project_root = [not toml").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn exec_extension_check_is_case_insensitive() {
        let settings = Settings::default();
        assert!(settings.is_exec_extension("PY"));
        assert!(!settings.is_exec_extension("rs"));
    }
}
