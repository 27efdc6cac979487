use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("project root '{0}' does not exist or is not a directory")]
    InvalidRoot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path error: {0}")]
    Path(#[from] patchpilot_protocol::PathError),
}

/// Per-file failure when reading indexed content. Non-fatal to the caller's
/// batch; the index itself stays valid.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("'{0}' is not in the project index")]
    NotIndexed(String),

    #[error("'{0}' is a binary file and cannot be included as text")]
    Binary(String),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}
