//! Local side of a chunked upload: fingerprinting, chunk planning,
//! per-attempt session state and throughput measurement.

mod chunked;
mod fingerprint;
mod progress;
mod session;
mod types;
mod validation;

pub use chunked::{ChunkReader, chunk_count, plan_chunks};
pub use fingerprint::{ContentFingerprinter, Fingerprinter, HashAlgorithm, fingerprint_bytes};
pub use progress::ThroughputMeter;
pub use session::SessionState;
pub use types::{Chunk, ChunkStatus};
pub use validation::validate_file_name;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk size must be positive")]
    InvalidChunkSize,

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("cancelled")]
    Cancelled,
}
