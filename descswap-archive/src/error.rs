//! Error types for archive access and content staging.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("no entry with checksum {0}")]
    EntryNotFound(String),

    #[error("staged content mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}
