use std::collections::{BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chunklift_protocol::Progress;
use tracing::warn;

use crate::types::{Chunk, ChunkStatus};

/// Mutable record of one upload attempt.
///
/// All mutations happen under a single lock that is never held across
/// an `.await`, so claiming a chunk and confirming it are indivisible
/// with respect to other workers.
pub struct SessionState {
    inner: Mutex<SessionInner>,
}

struct SessionInner {
    fingerprint: String,
    chunks: Vec<Chunk>,
    confirmed: BTreeSet<usize>,
    failed: BTreeSet<usize>,
    /// Unclaimed indices in ascending order; the claim cursor.
    pending: VecDeque<usize>,
    cancelled: bool,
}

impl SessionState {
    /// Creates a session for `chunks`, treating `already_confirmed` as
    /// uploaded by an earlier attempt.
    ///
    /// Indices outside `0..chunks.len()` are dropped.
    pub fn new(
        fingerprint: impl Into<String>,
        mut chunks: Vec<Chunk>,
        already_confirmed: impl IntoIterator<Item = usize>,
    ) -> Self {
        let fingerprint = fingerprint.into();
        let total = chunks.len();

        let mut confirmed = BTreeSet::new();
        for index in already_confirmed {
            if index < total {
                confirmed.insert(index);
            } else {
                warn!(%fingerprint, index, total, "ignoring out-of-range confirmed index");
            }
        }

        let mut pending = VecDeque::with_capacity(total - confirmed.len());
        for chunk in &mut chunks {
            if confirmed.contains(&chunk.index) {
                chunk.status = ChunkStatus::Confirmed;
            } else {
                chunk.status = ChunkStatus::Pending;
                pending.push_back(chunk.index);
            }
        }

        Self {
            inner: Mutex::new(SessionInner {
                fingerprint,
                chunks,
                confirmed,
                failed: BTreeSet::new(),
                pending,
                cancelled: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the lowest unclaimed index and marks it in flight.
    ///
    /// Returns `None` once the queue is empty or the session is cancelled.
    pub fn claim_next(&self) -> Option<Chunk> {
        let mut s = self.lock();
        if s.cancelled {
            return None;
        }
        let index = s.pending.pop_front()?;
        let chunk = &mut s.chunks[index];
        chunk.status = ChunkStatus::InFlight;
        Some(chunk.clone())
    }

    /// Records a successful upload and returns the updated progress.
    pub fn confirm(&self, index: usize) -> Progress {
        let mut s = self.lock();
        if let Some(chunk) = s.chunks.get_mut(index) {
            chunk.status = ChunkStatus::Confirmed;
            s.confirmed.insert(index);
            s.failed.remove(&index);
        }
        Progress::from_confirmed(s.confirmed.clone(), s.chunks.len())
    }

    /// Records a terminal failure for `index`.
    ///
    /// The index stays out of the pending queue for this attempt but is
    /// reported by [`failed_indices`](Self::failed_indices).
    pub fn fail(&self, index: usize) {
        let mut s = self.lock();
        if let Some(chunk) = s.chunks.get_mut(index) {
            chunk.status = ChunkStatus::Failed;
            s.failed.insert(index);
        }
    }

    /// Marks an in-flight chunk as waiting for another transport call.
    pub fn mark_retrying(&self, index: usize) {
        self.set_status(index, ChunkStatus::Retrying);
    }

    /// Marks a retrying chunk as in flight again.
    pub fn mark_in_flight(&self, index: usize) {
        self.set_status(index, ChunkStatus::InFlight);
    }

    /// Puts a claimed but unfinished chunk back into the pending queue,
    /// keeping the queue in ascending order.
    pub fn release(&self, index: usize) {
        let mut s = self.lock();
        if index >= s.chunks.len() || s.confirmed.contains(&index) || s.pending.contains(&index) {
            return;
        }
        s.chunks[index].status = ChunkStatus::Pending;
        let pos = s.pending.partition_point(|&i| i < index);
        s.pending.insert(pos, index);
    }

    fn set_status(&self, index: usize, status: ChunkStatus) {
        let mut s = self.lock();
        if let Some(chunk) = s.chunks.get_mut(index) {
            chunk.status = status;
        }
    }

    /// Stops all further claims.
    pub fn cancel(&self) {
        self.lock().cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Returns `true` once every chunk is confirmed.
    pub fn is_complete(&self) -> bool {
        let s = self.lock();
        s.confirmed.len() == s.chunks.len()
    }

    /// Derived progress view.
    pub fn progress(&self) -> Progress {
        let s = self.lock();
        Progress::from_confirmed(s.confirmed.clone(), s.chunks.len())
    }

    pub fn confirmed(&self) -> BTreeSet<usize> {
        self.lock().confirmed.clone()
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.lock().failed.iter().copied().collect()
    }

    /// Number of chunks still waiting to be claimed.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn total_chunks(&self) -> usize {
        self.lock().chunks.len()
    }

    pub fn fingerprint(&self) -> String {
        self.lock().fingerprint.clone()
    }

    pub fn chunk_status(&self, index: usize) -> Option<ChunkStatus> {
        self.lock().chunks.get(index).map(|c| c.status)
    }

    /// Total bytes of the chunks not yet confirmed.
    pub fn remaining_bytes(&self) -> u64 {
        let s = self.lock();
        s.chunks
            .iter()
            .filter(|c| !s.confirmed.contains(&c.index))
            .map(Chunk::len)
            .sum()
    }
}
