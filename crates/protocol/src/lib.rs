pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, Endpoint};
pub use messages::{CheckFileRequest, CheckFileResponse, MergeChunksRequest};
pub use types::{Progress, UploadPhase};
