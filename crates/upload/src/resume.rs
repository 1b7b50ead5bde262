//! Persistence of confirmed chunk indices across process restarts.
//!
//! The coordinator rehydrates from a [`ResumeStore`] before probing the
//! remote store, the scheduler records every confirmation, and the entry
//! is cleared once the file is assembled. Indices only mean something for
//! the chunk size they were recorded with, so entries carry it and a load
//! with another size starts from scratch.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ResumeError;

/// Keyed store of `fingerprint -> (chunk size, confirmed indices)`.
///
/// Calls may block on disk I/O; async callers go through [`run_blocking`].
pub trait ResumeStore: Send + Sync {
    /// Confirmed indices for `fingerprint` split at `chunk_size`; empty if
    /// unknown or recorded with a different chunk size.
    fn load(&self, fingerprint: &str, chunk_size: u64) -> Result<BTreeSet<usize>, ResumeError>;

    /// Replaces the entry for `fingerprint`.
    fn record(
        &self,
        fingerprint: &str,
        chunk_size: u64,
        confirmed: &BTreeSet<usize>,
    ) -> Result<(), ResumeError>;

    /// Forgets `fingerprint`.
    fn clear(&self, fingerprint: &str) -> Result<(), ResumeError>;
}

/// Runs `f` against `store` on the blocking thread pool.
pub async fn run_blocking<T, F>(store: &Arc<dyn ResumeStore>, f: F) -> Result<T, ResumeError>
where
    T: Send + 'static,
    F: FnOnce(&dyn ResumeStore) -> Result<T, ResumeError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref())).await?
}

fn matching(
    fingerprint: &str,
    chunk_size: u64,
    recorded_size: u64,
    confirmed: &BTreeSet<usize>,
) -> BTreeSet<usize> {
    if recorded_size == chunk_size {
        return confirmed.clone();
    }
    warn!(
        %fingerprint,
        recorded_size,
        chunk_size,
        "resume state was recorded with another chunk size, ignoring it"
    );
    BTreeSet::new()
}

// ---------------------------------------------------------------------------
// MemoryResumeStore
// ---------------------------------------------------------------------------

/// In-process store, mostly useful for tests and long-lived hosts.
#[derive(Default)]
pub struct MemoryResumeStore {
    entries: Mutex<HashMap<String, (u64, BTreeSet<usize>)>>,
}

impl MemoryResumeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResumeStore for MemoryResumeStore {
    fn load(&self, fingerprint: &str, chunk_size: u64) -> Result<BTreeSet<usize>, ResumeError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .get(fingerprint)
            .map(|(size, confirmed)| matching(fingerprint, chunk_size, *size, confirmed))
            .unwrap_or_default())
    }

    fn record(
        &self,
        fingerprint: &str,
        chunk_size: u64,
        confirmed: &BTreeSet<usize>,
    ) -> Result<(), ResumeError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(fingerprint.to_string(), (chunk_size, confirmed.clone()));
        Ok(())
    }

    fn clear(&self, fingerprint: &str) -> Result<(), ResumeError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(fingerprint);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonFileResumeStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResumeEntry {
    /// Zero for documents written before the size was stored; never matches.
    #[serde(default)]
    chunk_size: u64,
    confirmed: BTreeSet<usize>,
    updated_at: DateTime<Utc>,
}

/// Store backed by a single JSON document on disk.
///
/// Writes go to a sibling temp file first and are then renamed over the
/// document, so a crash never leaves a half-written file behind.
pub struct JsonFileResumeStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileResumeStore {
    /// Uses `path` as the document; it is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, ResumeEntry>, ResumeError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, ResumeEntry>) -> Result<(), ResumeError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ResumeStore for JsonFileResumeStore {
    fn load(&self, fingerprint: &str, chunk_size: u64) -> Result<BTreeSet<usize>, ResumeError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = self.read_all()?;
        Ok(entries
            .get(fingerprint)
            .map(|e| matching(fingerprint, chunk_size, e.chunk_size, &e.confirmed))
            .unwrap_or_default())
    }

    fn record(
        &self,
        fingerprint: &str,
        chunk_size: u64,
        confirmed: &BTreeSet<usize>,
    ) -> Result<(), ResumeError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        entries.insert(
            fingerprint.to_string(),
            ResumeEntry {
                chunk_size,
                confirmed: confirmed.clone(),
                updated_at: Utc::now(),
            },
        );
        self.write_all(&entries)?;
        debug!(%fingerprint, confirmed = confirmed.len(), "resume state saved");
        Ok(())
    }

    fn clear(&self, fingerprint: &str) -> Result<(), ResumeError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        if entries.remove(fingerprint).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}
