use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::TransferError;

/// Read buffer used while streaming a file through the hasher.
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Computes a stable content identifier for a file.
///
/// Implementations must be deterministic and must not hold the whole
/// file in memory.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint<'a>(
        &'a self,
        path: &'a Path,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + 'a>>;
}

/// Digest used for fingerprints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    /// For stores that key files by MD5.
    Md5,
}

enum Hasher {
    Sha256(Sha256),
    Md5(Md5),
}

impl Hasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Md5 => Self::Md5(Md5::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Md5(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Md5(h) => hex::encode(h.finalize()),
        }
    }
}

/// Hashes `data` in one go and returns the hex-encoded digest.
pub fn fingerprint_bytes(data: &[u8], algorithm: HashAlgorithm) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize_hex()
}

/// Streaming content hash over the file bytes.
#[derive(Debug, Clone)]
pub struct ContentFingerprinter {
    algorithm: HashAlgorithm,
    buffer_size: usize,
}

impl Default for ContentFingerprinter {
    fn default() -> Self {
        Self::new(HashAlgorithm::default())
    }
}

impl ContentFingerprinter {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Overrides the read buffer size. Zero keeps the default.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        if buffer_size > 0 {
            self.buffer_size = buffer_size;
        }
        self
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    async fn digest_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, TransferError> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Hasher::new(self.algorithm);
        let mut buf = vec![0u8; self.buffer_size];
        let mut total: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            total += n as u64;
        }

        let digest = hasher.finalize_hex();
        debug!(path = %path.display(), bytes = total, algorithm = ?self.algorithm, "fingerprint computed");
        Ok(digest)
    }
}

impl Fingerprinter for ContentFingerprinter {
    fn fingerprint<'a>(
        &'a self,
        path: &'a Path,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + 'a>> {
        Box::pin(self.digest_file(path, cancel))
    }
}
