use descswap_archive::ArchiveError;

/// Errors that abort an attach. Individual protocol step failures are not
/// errors; they live in the swap report and the protocol continues.
#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    /// The patch profile is absent or malformed. Fatal before any swap
    /// step runs.
    #[error("patch profile error: {0}")]
    Configuration(String),

    /// Replacement content could not be staged.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// A fatal-policy protocol step failed.
    #[error("swap aborted at step '{step}': {reason}")]
    TotalFailure { step: &'static str, reason: String },
}
