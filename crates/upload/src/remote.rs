//! Remote store collaborator traits.
//!
//! The engine only depends on these contracts. Implementations own the
//! actual transport; tests use in-memory mocks.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use chunklift_protocol::CheckFileResponse;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::types::Ack;

/// Boxed future returned by every store call.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// What the store already holds for a fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResult {
    /// The assembled file exists; nothing needs uploading.
    pub exists: bool,
    /// Chunks kept from an earlier partial upload.
    pub confirmed_indices: BTreeSet<usize>,
}

impl From<CheckFileResponse> for ProbeResult {
    fn from(resp: CheckFileResponse) -> Self {
        Self {
            exists: resp.exist,
            confirmed_indices: resp
                .uploaded_indexes
                .into_iter()
                .filter_map(|i| usize::try_from(i).ok())
                .collect(),
        }
    }
}

/// Asks the store whether a fingerprint is already known.
pub trait DedupProbe: Send + Sync {
    fn probe<'a>(&'a self, fingerprint: &'a str) -> StoreFuture<'a, ProbeResult>;
}

/// Uploads a single chunk.
///
/// Implementations should abort the request promptly once `cancel`
/// fires and return [`StoreError::Cancelled`].
pub trait ChunkTransport: Send + Sync {
    fn upload_chunk<'a>(
        &'a self,
        fingerprint: &'a str,
        index: usize,
        data: Bytes,
        cancel: &'a CancellationToken,
    ) -> StoreFuture<'a, ()>;
}

/// Asks the store to assemble all chunks of a fingerprint.
///
/// Must be safe to call twice for the same fingerprint.
pub trait MergeRequester: Send + Sync {
    fn merge<'a>(&'a self, fingerprint: &'a str, file_name: &'a str) -> StoreFuture<'a, Ack>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_result_from_wire() {
        let resp = CheckFileResponse {
            exist: false,
            uploaded_indexes: vec![2, 0, 2],
        };
        let probe = ProbeResult::from(resp);
        assert!(!probe.exists);
        assert_eq!(probe.confirmed_indices, BTreeSet::from([0, 2]));
    }
}
