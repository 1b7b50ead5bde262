//! Bounded-concurrency chunk upload pool.
//!
//! Workers are plain futures polled together in the caller's task. Each
//! one pulls the next pending index from the [`SessionState`], uploads it
//! and records the result, until the queue is empty or the attempt is
//! cancelled.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use chunklift_transfer::{Chunk, ChunkReader, SessionState, ThroughputMeter, TransferError};
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{StoreError, UploadError};
use crate::remote::ChunkTransport;
use crate::resume::{ResumeStore, run_blocking};
use crate::types::{RetryPolicy, UploadEvent};

/// How a single chunk ended.
enum ChunkResult {
    Confirmed,
    Failed(StoreError),
    /// Cancellation interrupted the call; the chunk goes back to pending.
    Aborted,
}

/// Uploads every pending chunk of a session with at most `concurrency`
/// simultaneous transport calls.
pub struct ChunkScheduler<'a> {
    session: &'a SessionState,
    reader: &'a ChunkReader,
    transport: &'a dyn ChunkTransport,
    fingerprint: String,
    concurrency: usize,
    retry: RetryPolicy,
    events: Option<&'a mpsc::Sender<UploadEvent>>,
    resume: Option<(Arc<dyn ResumeStore>, u64)>,
    /// Keeps resume writes in order; each one stores the newest set.
    persist_order: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    /// Child of `cancel`; also fired internally on a fatal read error.
    halt: CancellationToken,
    meter: ThroughputMeter,
    read_error: Mutex<Option<TransferError>>,
}

impl<'a> ChunkScheduler<'a> {
    pub fn new(
        session: &'a SessionState,
        reader: &'a ChunkReader,
        transport: &'a dyn ChunkTransport,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fingerprint: session.fingerprint(),
            session,
            reader,
            transport,
            concurrency: chunklift_protocol::DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            events: None,
            resume: None,
            persist_order: tokio::sync::Mutex::new(()),
            halt: cancel.child_token(),
            cancel,
            meter: ThroughputMeter::default(),
            read_error: Mutex::new(None),
        }
    }

    /// Sets the worker count. Zero is treated as one.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn events(mut self, events: &'a mpsc::Sender<UploadEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Persists the confirmed set after every successful chunk, tagged
    /// with the `chunk_size` the session was planned with.
    pub fn resume_store(mut self, store: Arc<dyn ResumeStore>, chunk_size: u64) -> Self {
        self.resume = Some((store, chunk_size));
        self
    }

    /// Runs the pool until every worker has stopped.
    ///
    /// Resolves `Ok` only if no chunk failed and the attempt was not
    /// cancelled. Chunks confirmed before a failure stay confirmed.
    pub async fn run(&self) -> Result<(), UploadError> {
        let pending = self.session.pending_count();
        let workers = self.concurrency.min(pending);
        debug!(
            fingerprint = %self.fingerprint,
            pending,
            workers,
            "scheduler starting"
        );

        join_all((0..workers).map(|id| self.worker(id))).await;

        let taken = self
            .read_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let progress = self.session.progress();
        if let Some(source) = taken {
            return Err(UploadError::ChunkRead { source, progress });
        }

        if self.cancel.is_cancelled() || self.session.is_cancelled() {
            return Err(UploadError::Cancelled { progress });
        }

        let failed = self.session.failed_indices();
        if !failed.is_empty() {
            return Err(UploadError::ChunkUpload { failed, progress });
        }

        Ok(())
    }

    fn claim(&self) -> Option<Chunk> {
        if self.halt.is_cancelled() {
            return None;
        }
        self.session.claim_next()
    }

    async fn worker(&self, id: usize) {
        while let Some(chunk) = self.claim() {
            let index = chunk.index;

            let read = tokio::select! {
                biased;
                _ = self.halt.cancelled() => {
                    self.session.release(index);
                    break;
                }
                read = self.reader.read_chunk(&chunk) => read,
            };
            let data = match read {
                Ok(data) => Bytes::from(data),
                Err(e) => {
                    error!(worker = id, index, error = %e, "failed to read chunk");
                    self.session.release(index);
                    self.record_read_error(e);
                    self.halt.cancel();
                    break;
                }
            };

            match self.upload(&chunk, data).await {
                ChunkResult::Confirmed => {
                    let progress = self.session.confirm(index);
                    self.meter.record(chunk.len());
                    debug!(worker = id, index, percent = progress.percent, "chunk confirmed");

                    self.emit(UploadEvent::ChunkConfirmed { index });
                    self.emit(UploadEvent::Progress {
                        progress,
                        bytes_per_second: self.meter.bytes_per_second(),
                    });
                    self.persist(index).await;
                }
                ChunkResult::Failed(e) => {
                    warn!(worker = id, index, error = %e, "chunk upload failed");
                    self.session.fail(index);
                    self.emit(UploadEvent::ChunkFailed {
                        index,
                        error: e.to_string(),
                    });
                }
                ChunkResult::Aborted => {
                    debug!(worker = id, index, "chunk upload aborted");
                    self.session.release(index);
                    break;
                }
            }
        }
        debug!(worker = id, "worker finished");
    }

    /// One chunk, including any retries the policy allows.
    async fn upload(&self, chunk: &Chunk, data: Bytes) -> ChunkResult {
        let mut retry = 0;
        loop {
            let call = self.transport.upload_chunk(
                &self.fingerprint,
                chunk.index,
                data.clone(),
                &self.halt,
            );
            let result = tokio::select! {
                biased;
                _ = self.halt.cancelled() => return ChunkResult::Aborted,
                result = call => result,
            };

            match result {
                Ok(()) => return ChunkResult::Confirmed,
                Err(StoreError::Cancelled) if self.halt.is_cancelled() => {
                    return ChunkResult::Aborted;
                }
                Err(e) if retry < self.retry.max_retries => {
                    retry += 1;
                    let delay = self.retry.delay_for(retry);
                    debug!(index = chunk.index, retry, ?delay, error = %e, "retrying chunk");
                    self.session.mark_retrying(chunk.index);
                    self.emit(UploadEvent::ChunkRetrying {
                        index: chunk.index,
                        retry,
                        delay,
                    });

                    tokio::select! {
                        biased;
                        _ = self.halt.cancelled() => return ChunkResult::Aborted,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    self.session.mark_in_flight(chunk.index);
                }
                Err(e) => return ChunkResult::Failed(e),
            }
        }
    }

    /// Writes the current confirmed set on the blocking pool.
    async fn persist(&self, index: usize) {
        let Some((store, chunk_size)) = &self.resume else {
            return;
        };
        let _order = self.persist_order.lock().await;
        let confirmed = self.session.confirmed();
        let fingerprint = self.fingerprint.clone();
        let chunk_size = *chunk_size;
        let written = run_blocking(store, move |s| s.record(&fingerprint, chunk_size, &confirmed));
        if let Err(e) = written.await {
            warn!(index, error = %e, "failed to persist resume state");
        }
    }

    fn record_read_error(&self, err: TransferError) {
        let mut slot = self.read_error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(tx) = self.events {
            // Progress is best-effort; never stall a worker on a slow consumer.
            let _ = tx.try_send(event);
        }
    }
}
