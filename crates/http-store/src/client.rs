//! Remote store client.
//!
//! Async HTTP client using `reqwest`: JSON for the probe and merge calls,
//! multipart for chunk bodies.

use std::time::Duration;

use bytes::Bytes;
use chunklift_protocol::constants::{
    CHUNK_REQUEST_TIMEOUT, FIELD_FILE, FIELD_FILE_HASH, FIELD_INDEX, REQUEST_TIMEOUT,
};
use chunklift_protocol::{CheckFileRequest, CheckFileResponse, Endpoint, MergeChunksRequest};
use chunklift_upload::{
    Ack, ChunkTransport, DedupProbe, MergeRequester, ProbeResult, StoreError, StoreFuture,
};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Store reachable over HTTP at a base URL.
pub struct HttpStore {
    http: reqwest::Client,
    base_url: String,
    chunk_timeout: Duration,
}

impl HttpStore {
    /// Creates a store client with the default timeouts.
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        Self::with_timeouts(base_url, REQUEST_TIMEOUT, CHUNK_REQUEST_TIMEOUT)
    }

    /// `request_timeout` bounds probe and merge calls, `chunk_timeout` a
    /// single chunk upload.
    pub fn with_timeouts(
        base_url: &str,
        request_timeout: Duration,
        chunk_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(transport)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            chunk_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// POSTs a JSON body and returns the raw response body.
    async fn post_json<T: Serialize>(
        &self,
        endpoint: Endpoint,
        body: &T,
    ) -> Result<Bytes, StoreError> {
        let resp = self
            .http
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        read_success(resp).await
    }

    async fn send_chunk(
        &self,
        fingerprint: &str,
        index: usize,
        data: Bytes,
    ) -> Result<(), StoreError> {
        let len = data.len() as u64;
        let file = Part::stream_with_length(data, len)
            .file_name(format!("{fingerprint}-{index}"))
            .mime_str("application/octet-stream")
            .map_err(transport)?;
        let form = Form::new()
            .part(FIELD_FILE, file)
            .text(FIELD_INDEX, index.to_string())
            .text(FIELD_FILE_HASH, fingerprint.to_string());

        let resp = self
            .http
            .post(self.url(Endpoint::UploadChunk))
            .timeout(self.chunk_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        read_success(resp).await?;
        Ok(())
    }
}

impl DedupProbe for HttpStore {
    fn probe<'a>(&'a self, fingerprint: &'a str) -> StoreFuture<'a, ProbeResult> {
        Box::pin(async move {
            let req = CheckFileRequest {
                file_hash: fingerprint.to_string(),
            };
            let body = self.post_json(Endpoint::CheckFile, &req).await?;
            let resp: CheckFileResponse = serde_json::from_slice(&body)?;
            debug!(
                %fingerprint,
                exist = resp.exist,
                uploaded = resp.uploaded_indexes.len(),
                "probe answered"
            );
            Ok(resp.into())
        })
    }
}

impl ChunkTransport for HttpStore {
    fn upload_chunk<'a>(
        &'a self,
        fingerprint: &'a str,
        index: usize,
        data: Bytes,
        cancel: &'a CancellationToken,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(StoreError::Cancelled),
                result = self.send_chunk(fingerprint, index, data) => result,
            }
        })
    }
}

impl MergeRequester for HttpStore {
    fn merge<'a>(&'a self, fingerprint: &'a str, file_name: &'a str) -> StoreFuture<'a, Ack> {
        Box::pin(async move {
            let req = MergeChunksRequest {
                file_hash: fingerprint.to_string(),
                file_name: file_name.to_string(),
            };
            self.post_json(Endpoint::MergeChunks, &req).await?;
            Ok(Ack {
                fingerprint: fingerprint.to_string(),
                file_name: file_name.to_string(),
                deduplicated: false,
            })
        })
    }
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Transport(e.to_string())
}

/// Returns the body of a 2xx response; anything else is a `Status` error.
async fn read_success(resp: reqwest::Response) -> Result<Bytes, StoreError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(StoreError::Status {
            status: status.as_u16(),
            body,
        });
    }
    resp.bytes().await.map_err(transport)
}
