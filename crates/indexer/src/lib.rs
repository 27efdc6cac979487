//! # Patchpilot Indexer
//!
//! Addressable, incrementally-refreshable view of a project tree.
//!
//! ## Pipeline
//!
//! ```text
//! Project root
//!     │
//!     ├──> File Scanner (.gitignore aware, ignore-pattern pruning)
//!     │      └─> Regular files with metadata
//!     │
//!     └──> Project Index (snapshot replaced wholesale on each scan)
//!            ├─> substring find
//!            ├─> rendered project tree
//!            └─> capped content reads
//! ```

mod error;
mod index;
mod scanner;
mod stats;

pub use error::{IndexError, ReadError, Result};
pub use index::{ContentKind, FileContent, IndexedFile, ProjectIndex};
pub use scanner::{FileScanner, ScannedFile, MAX_INDEXED_FILE_BYTES};
pub use stats::ScanStats;
