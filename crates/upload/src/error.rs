//! Upload error types.

use chunklift_protocol::Progress;
use chunklift_transfer::TransferError;

/// Errors reported by a remote store collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cancelled")]
    Cancelled,
}

/// Errors from the resume-state store.
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("resume task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Terminal result of a failed or cancelled upload attempt.
///
/// Variants raised once chunks exist carry the last known [`Progress`].
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to read file: {0}")]
    Read(#[source] TransferError),

    #[error("failed to read chunk: {source}")]
    ChunkRead {
        #[source]
        source: TransferError,
        progress: Progress,
    },

    #[error("dedup probe failed: {0}")]
    Probe(#[source] StoreError),

    #[error("{} chunk(s) failed to upload: {failed:?}", .failed.len())]
    ChunkUpload { failed: Vec<usize>, progress: Progress },

    #[error("merge failed: {source}")]
    Merge {
        #[source]
        source: StoreError,
        progress: Progress,
    },

    #[error("cancelled")]
    Cancelled { progress: Progress },

    #[error("invalid upload options: {0}")]
    InvalidOptions(String),

    #[error("an upload is already running on this coordinator")]
    AlreadyRunning,

    #[error("coordinator was cancelled")]
    AlreadyCancelled,
}

impl UploadError {
    /// Progress at the moment the attempt stopped, if chunking had begun.
    pub fn progress(&self) -> Option<&Progress> {
        match self {
            Self::ChunkUpload { progress, .. }
            | Self::ChunkRead { progress, .. }
            | Self::Merge { progress, .. }
            | Self::Cancelled { progress } => Some(progress),
            _ => None,
        }
    }

    /// Returns `true` if the caller stopped the attempt.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Indices whose upload failed, empty for other errors.
    pub fn failed_indices(&self) -> &[usize] {
        match self {
            Self::ChunkUpload { failed, .. } => failed,
            _ => &[],
        }
    }
}
