use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::TransferError;
use crate::types::{Chunk, ChunkStatus};

/// Number of chunks needed to cover `file_size` bytes.
pub fn chunk_count(file_size: u64, chunk_size: u64) -> Result<u64, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize);
    }
    Ok(file_size.div_ceil(chunk_size))
}

/// Splits `[0, file_size)` into consecutive fixed-size ranges.
///
/// Every range is `chunk_size` long except possibly the last one. An
/// empty file yields no chunks.
pub fn plan_chunks(file_size: u64, chunk_size: u64) -> Result<Vec<Chunk>, TransferError> {
    let count = chunk_count(file_size, chunk_size)?;
    let chunks = (0..count)
        .map(|i| {
            let start = i * chunk_size;
            Chunk {
                index: i as usize,
                start,
                end: (start + chunk_size).min(file_size),
                status: ChunkStatus::Pending,
            }
        })
        .collect();
    Ok(chunks)
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads the bytes of individual chunks from a local file.
///
/// Each read opens its own handle, so concurrent workers never share a
/// file cursor.
#[derive(Debug, Clone)]
pub struct ChunkReader {
    path: PathBuf,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` and records its current size.
    pub async fn open(path: &Path) -> Result<Self, TransferError> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            file_size: metadata.len(),
        })
    }

    /// Reads exactly the bytes covered by `chunk`.
    ///
    /// Fails with an `UnexpectedEof` I/O error if the file shrank since
    /// it was opened.
    pub async fn read_chunk(&self, chunk: &Chunk) -> Result<Vec<u8>, TransferError> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(chunk.start)).await?;
        let mut buf = vec![0u8; chunk.len() as usize];
        file.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
