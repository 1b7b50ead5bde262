//! Data types for the upload flow.

use std::time::Duration;

use chunklift_protocol::{DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, Progress, UploadPhase};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Store acknowledgement that the file is fully assembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub fingerprint: String,
    pub file_name: String,
    /// The store already held the file, so nothing was uploaded.
    #[serde(default)]
    pub deduplicated: bool,
}

/// Per-chunk retry with exponential backoff.
///
/// `max_retries == 0` disables retrying: the first failed call marks the
/// chunk failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based), doubling each time.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

/// Parameters of a single `start` call.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Maximum simultaneous chunk uploads.
    pub concurrency: usize,
    /// Chunk size in bytes.
    pub chunk_size: u64,
    /// Name sent with the merge request; defaults to the file's name.
    pub file_name: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            file_name: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl UploadOptions {
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.concurrency == 0 {
            return Err(UploadError::InvalidOptions(
                "concurrency must be at least 1".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(UploadError::InvalidOptions(
                "chunk size must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Event emitted while an upload runs.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// The attempt moved to a new phase.
    Phase(UploadPhase),
    /// Aggregate progress after a chunk was confirmed.
    Progress {
        progress: Progress,
        bytes_per_second: f64,
    },
    ChunkConfirmed { index: usize },
    /// A chunk call failed and will be retried after `delay`.
    ChunkRetrying {
        index: usize,
        retry: u32,
        delay: Duration,
    },
    /// A chunk failed for good in this attempt.
    ChunkFailed { index: usize, error: String },
}

/// Caller-facing summary of an attempt.
#[derive(Debug)]
pub enum UploadOutcome {
    Done(Ack),
    Cancelled(Progress),
    Failed {
        error: UploadError,
        progress: Progress,
    },
}

impl From<Result<Ack, UploadError>> for UploadOutcome {
    fn from(result: Result<Ack, UploadError>) -> Self {
        match result {
            Ok(ack) => Self::Done(ack),
            Err(UploadError::Cancelled { progress }) => Self::Cancelled(progress),
            Err(error) => {
                let progress = error.progress().cloned().unwrap_or_default();
                Self::Failed { error, progress }
            }
        }
    }
}
