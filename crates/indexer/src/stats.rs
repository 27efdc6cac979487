use serde::{Deserialize, Serialize};

/// Statistics about one scan pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    /// Number of files indexed
    pub files: usize,

    /// Total bytes across indexed files
    pub total_bytes: u64,

    /// Files skipped for exceeding the size cap
    pub skipped_large: usize,

    /// Time taken in milliseconds
    pub duration_ms: u64,

    /// Non-fatal errors encountered while walking
    pub errors: Vec<String>,
}

impl ScanStats {
    pub fn add_file(&mut self, bytes: u64) {
        self.files += 1;
        self.total_bytes += bytes;
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }
}
