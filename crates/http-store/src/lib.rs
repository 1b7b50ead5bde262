//! HTTP remote store for `chunklift-upload`.
//!
//! [`HttpStore`] speaks the three-endpoint protocol (`/checkFile`,
//! `/uploadChunk`, `/mergeChunks`) and implements every collaborator trait
//! the upload coordinator needs, so one instance can be handed to
//! [`chunklift_upload::UploadCoordinator::new`].

pub mod client;

pub use client::HttpStore;
