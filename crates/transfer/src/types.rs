use std::ops::Range;

/// Upload state of one chunk within an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkStatus {
    Pending,
    InFlight,
    /// Waiting out a backoff delay before another transport call.
    Retrying,
    Confirmed,
    Failed,
}

/// A contiguous byte range of the source file, addressed by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Dense, 0-based position; index order is byte order.
    pub index: usize,
    /// First byte (inclusive).
    pub start: u64,
    /// Last byte (exclusive).
    pub end: u64,
    pub status: ChunkStatus,
}

impl Chunk {
    /// Size of this chunk in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }
}
