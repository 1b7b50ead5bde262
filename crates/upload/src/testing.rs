//! In-memory collaborators used by the scheduler and coordinator tests.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chunklift_transfer::{Fingerprinter, TransferError};
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::remote::{ChunkTransport, DedupProbe, MergeRequester, ProbeResult, StoreFuture};
use crate::types::Ack;

/// Mock store that records every call.
#[derive(Default)]
pub(crate) struct MockStore {
    /// Returned by `probe`; `None` makes the probe fail.
    pub probe: Option<ProbeResult>,
    /// Indices that always fail.
    pub fail_indices: Vec<usize>,
    /// Index -> number of calls that fail before one succeeds.
    pub flaky: Mutex<HashMap<usize, u32>>,
    /// Calls after this many succeed wait for cancellation instead.
    pub block_after: Option<usize>,
    /// Every call waits here before proceeding.
    pub barrier: Option<Barrier>,
    pub delay: Duration,
    pub merge_fails: bool,
    /// `probe` never resolves; the caller has to give up on it.
    pub probe_hangs: bool,
    /// Runs with the call number after every successful upload.
    pub after_upload: Option<Box<dyn Fn(usize) + Send + Sync>>,

    pub probes: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<(usize, usize)>>,
    pub merges: Mutex<Vec<(String, String)>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockStore {
    /// A store that knows nothing about any file.
    pub fn empty() -> Self {
        Self {
            probe: Some(ProbeResult::default()),
            ..Self::default()
        }
    }

    /// Chunk indices in call order.
    pub fn uploaded_indices(&self) -> Vec<usize> {
        self.uploads.lock().unwrap().iter().map(|u| u.0).collect()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn merge_count(&self) -> usize {
        self.merges.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn simulate(
        &self,
        index: usize,
        call: usize,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if self.block_after.is_some_and(|n| call > n) {
            cancel.cancelled().await;
            return Err(StoreError::Cancelled);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_indices.contains(&index) {
            return Err(StoreError::Status {
                status: 500,
                body: format!("chunk {index} rejected"),
            });
        }
        let flaky = {
            let mut flaky = self.flaky.lock().unwrap();
            match flaky.get_mut(&index) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };
        if flaky {
            return Err(StoreError::Transport("connection reset".into()));
        }
        Ok(())
    }
}

impl DedupProbe for MockStore {
    fn probe<'a>(&'a self, fingerprint: &'a str) -> StoreFuture<'a, ProbeResult> {
        self.probes.lock().unwrap().push(fingerprint.to_string());
        Box::pin(async move {
            if self.probe_hangs {
                std::future::pending::<()>().await;
            }
            self.probe
                .clone()
                .ok_or_else(|| StoreError::Transport("probe unavailable".into()))
        })
    }
}

impl ChunkTransport for MockStore {
    fn upload_chunk<'a>(
        &'a self,
        _fingerprint: &'a str,
        index: usize,
        data: Bytes,
        cancel: &'a CancellationToken,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let call = {
                let mut uploads = self.uploads.lock().unwrap();
                uploads.push((index, data.len()));
                uploads.len()
            };
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let result = self.simulate(index, call, cancel).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if result.is_ok()
                && let Some(hook) = &self.after_upload
            {
                hook(call);
            }
            result
        })
    }
}

impl MergeRequester for MockStore {
    fn merge<'a>(&'a self, fingerprint: &'a str, file_name: &'a str) -> StoreFuture<'a, Ack> {
        self.merges
            .lock()
            .unwrap()
            .push((fingerprint.to_string(), file_name.to_string()));
        Box::pin(async move {
            if self.merge_fails {
                return Err(StoreError::Status {
                    status: 500,
                    body: "merge failed".into(),
                });
            }
            Ok(Ack {
                fingerprint: fingerprint.to_string(),
                file_name: file_name.to_string(),
                deduplicated: false,
            })
        })
    }
}

/// Fingerprinter that never finishes on its own; it only reports
/// cancellation.
#[derive(Default)]
pub(crate) struct StalledFingerprinter {
    pub started: AtomicUsize,
}

impl Fingerprinter for StalledFingerprinter {
    fn fingerprint<'a>(
        &'a self,
        _path: &'a Path,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + 'a>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            cancel.cancelled().await;
            Err(TransferError::Cancelled)
        })
    }
}

/// Writes `len` patterned bytes to `dir/name`.
pub(crate) fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}

/// Polls `cond` until it holds, panicking after two seconds.
pub(crate) async fn wait_until(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
