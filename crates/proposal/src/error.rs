use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApplyError>;

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("admin mode does not permit file writes")]
    PermissionDenied,

    #[error("path error: {0}")]
    Path(#[from] patchpilot_protocol::PathError),

    #[error("failed to write '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}
