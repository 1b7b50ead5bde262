use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Step of a single upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    Idle,
    Fingerprinting,
    Probing,
    /// The store already holds the file; nothing is uploaded.
    Skipping,
    Chunking,
    Scheduling,
    Merging,
    Done,
    Cancelled,
    Failed,
}

impl UploadPhase {
    /// Returns `true` for `Done`, `Cancelled` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }

    /// Returns `true` while an attempt is between `Idle` and a terminal phase.
    pub fn is_running(self) -> bool {
        !matches!(self, Self::Idle) && !self.is_terminal()
    }
}

/// Aggregate progress of an upload attempt.
///
/// Always derived from the session's confirmed set, never stored on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub percent: u8,
    pub confirmed_indices: BTreeSet<usize>,
    pub total_chunks: usize,
}

impl Progress {
    /// Builds a progress view from a confirmed set.
    ///
    /// A session with no chunks counts as complete.
    pub fn from_confirmed(confirmed: BTreeSet<usize>, total_chunks: usize) -> Self {
        let percent = if total_chunks == 0 {
            100
        } else {
            ((confirmed.len() as f64 / total_chunks as f64) * 100.0).round() as u8
        };
        Self {
            percent,
            confirmed_indices: confirmed,
            total_chunks,
        }
    }

    /// Number of confirmed chunks.
    pub fn confirmed(&self) -> usize {
        self.confirmed_indices.len()
    }

    /// Returns `true` once every chunk is confirmed.
    pub fn is_complete(&self) -> bool {
        self.confirmed_indices.len() == self.total_chunks
    }
}
