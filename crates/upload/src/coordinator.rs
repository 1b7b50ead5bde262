//! Single entry point that drives one upload attempt end to end.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chunklift_protocol::{Progress, UploadPhase};
use chunklift_transfer::{
    ChunkReader, ContentFingerprinter, Fingerprinter, HashAlgorithm, SessionState, TransferError,
    plan_chunks, validate_file_name,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::UploadError;
use crate::remote::{ChunkTransport, DedupProbe, MergeRequester};
use crate::resume::{ResumeStore, run_blocking};
use crate::scheduler::ChunkScheduler;
use crate::types::{Ack, UploadEvent, UploadOptions};

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct CoordinatorState {
    phase: UploadPhase,
    session: Option<Arc<SessionState>>,
}

/// Fingerprints, probes, chunks, uploads and merges a file.
///
/// One coordinator runs at most one attempt at a time. `cancel`,
/// `progress` and `phase` may be called from other tasks while `start` is
/// pending, typically through an `Arc<UploadCoordinator>`.
pub struct UploadCoordinator {
    fingerprinter: Arc<dyn Fingerprinter>,
    probe: Arc<dyn DedupProbe>,
    transport: Arc<dyn ChunkTransport>,
    merger: Arc<dyn MergeRequester>,
    resume: Option<Arc<dyn ResumeStore>>,
    cancel: CancellationToken,
    state: Mutex<CoordinatorState>,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
}

impl UploadCoordinator {
    /// Uses one store for probing, chunk transport and merging.
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: DedupProbe + ChunkTransport + MergeRequester + 'static,
    {
        Self::from_parts(store.clone(), store.clone(), store)
    }

    pub fn from_parts(
        probe: Arc<dyn DedupProbe>,
        transport: Arc<dyn ChunkTransport>,
        merger: Arc<dyn MergeRequester>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            fingerprinter: Arc::new(ContentFingerprinter::new(HashAlgorithm::default())),
            probe,
            transport,
            merger,
            resume: None,
            cancel: CancellationToken::new(),
            state: Mutex::new(CoordinatorState {
                phase: UploadPhase::Idle,
                session: None,
            }),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Replaces the default SHA-256 fingerprinter.
    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    /// Persists confirmed chunks so a later process can resume.
    pub fn with_resume_store(mut self, store: Arc<dyn ResumeStore>) -> Self {
        self.resume = Some(store);
        self
    }

    /// Takes the event receiver. Returns `None` after the first call.
    ///
    /// Events are dropped, not queued, when nobody drains the channel.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops the running attempt and any future one.
    ///
    /// In-flight chunk calls are aborted; chunks already confirmed stay
    /// confirmed.
    pub fn cancel(&self) {
        let session = self.lock().session.clone();
        if let Some(session) = session {
            session.cancel();
        }
        self.cancel.cancel();
    }

    /// Progress of the current or most recent attempt.
    pub fn progress(&self) -> Progress {
        self.lock()
            .session
            .as_ref()
            .map(|s| s.progress())
            .unwrap_or_default()
    }

    pub fn phase(&self) -> UploadPhase {
        self.lock().phase
    }

    /// Uploads the file at `path`, resolving once the attempt reaches a
    /// terminal phase.
    pub async fn start(&self, path: &Path, options: UploadOptions) -> Result<Ack, UploadError> {
        options.validate()?;
        let file_name = resolve_file_name(path, options.file_name.as_deref())?;
        self.begin()?;

        let attempt = Uuid::new_v4();
        info!(%attempt, path = %path.display(), %file_name, "upload started");

        let result = self.run(attempt, path, &file_name, &options).await;
        self.finish(attempt, &result);
        result
    }

    async fn run(
        &self,
        attempt: Uuid,
        path: &Path,
        file_name: &str,
        options: &UploadOptions,
    ) -> Result<Ack, UploadError> {
        let fingerprint = match self.fingerprinter.fingerprint(path, &self.cancel).await {
            Ok(fp) => fp,
            Err(TransferError::Cancelled) => {
                return Err(UploadError::Cancelled {
                    progress: Progress::default(),
                });
            }
            Err(e) => return Err(UploadError::Read(e)),
        };
        debug!(%attempt, %fingerprint, "fingerprint computed");

        let mut known = self
            .load_resume(attempt, &fingerprint, options.chunk_size)
            .await;

        self.set_phase(UploadPhase::Probing);
        let probe = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(UploadError::Cancelled { progress: Progress::default() });
            }
            result = self.probe.probe(&fingerprint) => result.map_err(UploadError::Probe)?,
        };

        if probe.exists {
            self.set_phase(UploadPhase::Skipping);
            info!(%attempt, %fingerprint, "file already stored, skipping transfer");
            // Nothing to transfer; an empty session reports 100%.
            self.lock().session = Some(Arc::new(SessionState::new(
                fingerprint.clone(),
                Vec::new(),
                BTreeSet::new(),
            )));
            self.clear_resume(attempt, &fingerprint).await;
            return Ok(Ack {
                fingerprint,
                file_name: file_name.to_string(),
                deduplicated: true,
            });
        }

        self.set_phase(UploadPhase::Chunking);
        let reader = ChunkReader::open(path).await.map_err(UploadError::Read)?;
        let chunks = plan_chunks(reader.file_size(), options.chunk_size).map_err(UploadError::Read)?;
        known.extend(probe.confirmed_indices);

        let session = Arc::new(SessionState::new(fingerprint.clone(), chunks, known));
        self.lock().session = Some(session.clone());
        if self.cancel.is_cancelled() {
            session.cancel();
        }
        debug!(
            %attempt,
            total = session.total_chunks(),
            pending = session.pending_count(),
            "chunks planned"
        );

        self.set_phase(UploadPhase::Scheduling);
        let mut scheduler = ChunkScheduler::new(
            &session,
            &reader,
            self.transport.as_ref(),
            self.cancel.clone(),
        )
        .concurrency(options.concurrency)
        .retry(options.retry)
        .events(&self.events_tx);
        if let Some(store) = &self.resume {
            scheduler = scheduler.resume_store(store.clone(), options.chunk_size);
        }
        scheduler.run().await?;

        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled {
                progress: session.progress(),
            });
        }

        self.set_phase(UploadPhase::Merging);
        let ack = self
            .merger
            .merge(&fingerprint, file_name)
            .await
            .map_err(|source| UploadError::Merge {
                source,
                progress: session.progress(),
            })?;

        self.clear_resume(attempt, &fingerprint).await;
        Ok(ack)
    }

    /// Claims the coordinator for a new attempt; check and claim share one
    /// lock.
    fn begin(&self) -> Result<(), UploadError> {
        {
            let mut state = self.lock();
            if self.cancel.is_cancelled() {
                return Err(UploadError::AlreadyCancelled);
            }
            if state.phase.is_running() {
                return Err(UploadError::AlreadyRunning);
            }
            state.phase = UploadPhase::Fingerprinting;
            state.session = None;
        }
        self.announce(UploadPhase::Fingerprinting);
        Ok(())
    }

    fn finish(&self, attempt: Uuid, result: &Result<Ack, UploadError>) {
        let phase = match result {
            Ok(ack) => {
                info!(
                    %attempt,
                    fingerprint = %ack.fingerprint,
                    deduplicated = ack.deduplicated,
                    "upload complete"
                );
                UploadPhase::Done
            }
            Err(UploadError::Cancelled { progress }) => {
                warn!(%attempt, percent = progress.percent, "upload cancelled");
                UploadPhase::Cancelled
            }
            Err(e) => {
                error!(%attempt, error = %e, "upload failed");
                UploadPhase::Failed
            }
        };
        self.set_phase(phase);
    }

    async fn load_resume(
        &self,
        attempt: Uuid,
        fingerprint: &str,
        chunk_size: u64,
    ) -> BTreeSet<usize> {
        let Some(store) = &self.resume else {
            return BTreeSet::new();
        };
        let key = fingerprint.to_string();
        match run_blocking(store, move |s| s.load(&key, chunk_size)).await {
            Ok(known) => {
                if !known.is_empty() {
                    info!(%attempt, resumed = known.len(), "resuming from saved state");
                }
                known
            }
            Err(e) => {
                warn!(%attempt, error = %e, "failed to load resume state");
                BTreeSet::new()
            }
        }
    }

    async fn clear_resume(&self, attempt: Uuid, fingerprint: &str) {
        let Some(store) = &self.resume else {
            return;
        };
        let key = fingerprint.to_string();
        if let Err(e) = run_blocking(store, move |s| s.clear(&key)).await {
            warn!(%attempt, error = %e, "failed to clear resume state");
        }
    }

    fn set_phase(&self, phase: UploadPhase) {
        self.lock().phase = phase;
        self.announce(phase);
    }

    fn announce(&self, phase: UploadPhase) {
        debug!(?phase, "phase changed");
        let _ = self.events_tx.try_send(UploadEvent::Phase(phase));
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Name sent with the merge request: the explicit one, or the file's own.
fn resolve_file_name(path: &Path, explicit: Option<&str>) -> Result<String, UploadError> {
    let name = match explicit {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                UploadError::InvalidOptions(format!(
                    "cannot derive a file name from {}",
                    path.display()
                ))
            })?,
    };
    validate_file_name(&name).map_err(|e| UploadError::InvalidOptions(e.to_string()))?;
    Ok(name)
}
