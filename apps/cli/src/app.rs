//! Wires the HTTP store, resume state and coordinator together for one
//! upload.

use std::path::PathBuf;
use std::sync::Arc;

use chunklift_http_store::HttpStore;
use chunklift_protocol::constants::CHUNK_REQUEST_TIMEOUT;
use chunklift_transfer::ContentFingerprinter;
use chunklift_upload::{JsonFileResumeStore, UploadCoordinator, UploadEvent, UploadOutcome};
use tokio::sync::mpsc;

use crate::config::Config;

/// Uploads `file` and waits for the attempt to finish or for Ctrl-C.
pub async fn upload(config: Config, file: PathBuf, name: Option<String>) -> anyhow::Result<()> {
    let store = HttpStore::with_timeouts(
        &config.server_url,
        config.request_timeout(),
        CHUNK_REQUEST_TIMEOUT,
    )?;

    let mut coordinator = UploadCoordinator::new(Arc::new(store)).with_fingerprinter(Arc::new(
        ContentFingerprinter::new(config.hash_algorithm),
    ));
    if let Some(path) = &config.resume_state {
        tracing::debug!(path = %path.display(), "using resume state file");
        coordinator = coordinator.with_resume_store(Arc::new(JsonFileResumeStore::new(path)));
    }

    let events = coordinator.take_events();
    let coordinator = Arc::new(coordinator);

    let reporter = events.map(|rx| tokio::spawn(report(rx)));

    let interrupt = Arc::clone(&coordinator);
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("SIGINT received, cancelling upload");
            interrupt.cancel();
        }
    });

    let options = config.upload_options(name);
    let result = coordinator.start(&file, options).await;
    signal.abort();
    let _ = signal.await;

    // Closing the channel lets the reporter drain and exit.
    drop(coordinator);
    if let Some(reporter) = reporter {
        let _ = reporter.await;
    }

    match UploadOutcome::from(result) {
        UploadOutcome::Done(ack) => {
            if ack.deduplicated {
                tracing::info!(file = %ack.file_name, "already on the server, nothing uploaded");
            } else {
                tracing::info!(
                    file = %ack.file_name,
                    fingerprint = %ack.fingerprint,
                    "upload complete"
                );
            }
            Ok(())
        }
        UploadOutcome::Cancelled(progress) => {
            anyhow::bail!(
                "upload cancelled at {}% ({}/{} chunks)",
                progress.percent,
                progress.confirmed(),
                progress.total_chunks
            )
        }
        UploadOutcome::Failed { error, progress } => {
            tracing::error!(percent = progress.percent, "upload failed");
            Err(error.into())
        }
    }
}

/// Logs coordinator events until the channel closes.
async fn report(mut rx: mpsc::Receiver<UploadEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            // Terminal phases are reported from the outcome.
            UploadEvent::Phase(phase) => {
                if phase.is_running() {
                    tracing::info!(?phase, "phase");
                }
            }
            UploadEvent::Progress {
                progress,
                bytes_per_second,
            } => {
                tracing::info!(
                    percent = progress.percent,
                    chunks = %format!("{}/{}", progress.confirmed(), progress.total_chunks),
                    speed = %format_speed(bytes_per_second),
                    "progress"
                );
            }
            UploadEvent::ChunkConfirmed { index } => {
                tracing::debug!(index, "chunk confirmed");
            }
            UploadEvent::ChunkRetrying {
                index,
                retry,
                delay,
            } => {
                tracing::warn!(index, retry, ?delay, "retrying chunk");
            }
            UploadEvent::ChunkFailed { index, error } => {
                tracing::warn!(index, %error, "chunk failed");
            }
        }
    }
}

fn format_speed(bytes_per_second: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KiB/s", "MiB/s", "GiB/s"];
    let mut value = bytes_per_second;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
