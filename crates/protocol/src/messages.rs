//! JSON bodies exchanged with the remote store.
//!
//! Field names are camelCase on the wire. The chunk upload itself is a
//! multipart form and has no JSON body; its field names live in
//! [`crate::constants`].

use serde::{Deserialize, Serialize};

/// `POST /checkFile` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckFileRequest {
    pub file_hash: String,
}

/// `POST /checkFile` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckFileResponse {
    /// The assembled file already exists on the store.
    pub exist: bool,
    /// Chunk indices kept from an earlier partial upload.
    #[serde(default)]
    pub uploaded_indexes: Vec<u64>,
}

/// `POST /mergeChunks` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeChunksRequest {
    pub file_hash: String,
    pub file_name: String,
}
