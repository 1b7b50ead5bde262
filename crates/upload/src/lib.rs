//! Resumable, deduplicated, concurrency-bounded chunked upload engine.
//!
//! This crate holds the **orchestration**: it decides what to upload and
//! when, but never speaks HTTP itself. Callers provide the remote store
//! through the [`DedupProbe`], [`ChunkTransport`] and [`MergeRequester`]
//! traits (see `chunklift-http-store` for the HTTP implementation).
//!
//! # Pipeline
//!
//! 1. **Fingerprint**: stream the file through a content hash
//! 2. **Probe**: ask the store whether the file or some chunks exist
//! 3. **Chunk**: split the file into fixed-size ranges
//! 4. **Schedule**: upload missing chunks with a bounded worker pool
//! 5. **Merge**: ask the store to assemble the chunks

pub mod coordinator;
pub mod error;
pub mod remote;
pub mod resume;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience.
pub use coordinator::UploadCoordinator;
pub use error::{ResumeError, StoreError, UploadError};
pub use remote::{ChunkTransport, DedupProbe, MergeRequester, ProbeResult, StoreFuture};
pub use resume::{JsonFileResumeStore, MemoryResumeStore, ResumeStore};
pub use scheduler::ChunkScheduler;
pub use types::{Ack, RetryPolicy, UploadEvent, UploadOptions, UploadOutcome};

pub use chunklift_protocol::{Progress, UploadPhase};
