use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResumableError>;

#[derive(Debug, Error)]
pub enum ResumableError {
    /// Malformed arguments or configuration, detected before any I/O.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// The object cannot be fetched in byte ranges (empty, or ranges not advertised).
    #[error("s3://{bucket}/{key} cannot be downloaded in parts")]
    Incompatible { bucket: String, key: String },

    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Another process holds the lock for the same target file name.
    #[error("another instance is currently downloading {}", path.display())]
    Busy { path: PathBuf },

    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("key {key} does not exist in the object store")]
    ObjectMissing { key: String },

    #[error("part {part} has {actual} bytes on disk, expected {expected}")]
    PartSizeMismatch { part: u64, expected: u64, actual: u64 },

    #[error("assembled file has {actual} bytes, expected {expected}")]
    AssembledSizeMismatch { expected: u64, actual: u64 },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,

    #[error("object not accessible: {0}")]
    Inaccessible(String),

    #[error("transport error: {0}")]
    Transport(String),
}
