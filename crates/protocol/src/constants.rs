use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default number of simultaneous chunk uploads.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Timeout for the small JSON round-trips (probe, merge).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a single chunk upload.
///
/// Chunk bodies are several megabytes, so this is considerably longer
/// than [`REQUEST_TIMEOUT`].
pub const CHUNK_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Multipart field carrying the chunk bytes.
pub const FIELD_FILE: &str = "file";

/// Multipart field carrying the chunk index.
pub const FIELD_INDEX: &str = "index";

/// Multipart field carrying the file fingerprint.
pub const FIELD_FILE_HASH: &str = "fileHash";

/// Remote store endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    #[serde(rename = "checkFile")]
    CheckFile,
    #[serde(rename = "uploadChunk")]
    UploadChunk,
    #[serde(rename = "mergeChunks")]
    MergeChunks,
}

impl Endpoint {
    /// Returns the request path, relative to the store's base URL.
    pub fn path(self) -> &'static str {
        match self {
            Self::CheckFile => "/checkFile",
            Self::UploadChunk => "/uploadChunk",
            Self::MergeChunks => "/mergeChunks",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}
