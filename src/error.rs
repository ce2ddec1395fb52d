//! Error taxonomy for the harvester library.

use std::path::PathBuf;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// A required setting is missing or invalid. Raised before any stage runs.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The checkpoint file could not be written (or removed).
    #[error("Checkpoint I/O failed for {path}: {reason}")]
    StorageIo { path: PathBuf, reason: String },

    /// A single topic search or reply-thread fetch failed.
    #[error("Fetch failed for '{unit}': {reason}")]
    FetchFailure { unit: String, reason: String },

    /// The safety timeout around a fetch elapsed.
    #[error("Timed out fetching '{unit}' after {after_secs}s")]
    TimeoutExceeded { unit: String, after_secs: u64 },

    /// State accessed before `start_new_run` or `load`.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The operator cancelled the run. Progress stays in the checkpoint.
    #[error("Interrupted by operator")]
    Interrupted,

    #[error("No items collected for run {0}")]
    NothingCollected(String),

    #[error("Source pool unavailable: {0}")]
    PoolUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HarvestError {
    pub(crate) fn storage_io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::StorageIo {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn fetch_failure(unit: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::FetchFailure {
            unit: unit.into(),
            reason: err.to_string(),
        }
    }
}
