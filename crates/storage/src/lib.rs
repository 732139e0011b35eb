//! Object storage backends for link2cos.
//!
//! [`ObjectStorage`] is the seam between the transfer engine and a bucket:
//! a three-phase multipart protocol (initiate, upload part, complete or
//! abort) plus a single whole-object put. Two implementations ship here:
//!
//! - [`S3Client`]: S3-compatible REST API signed with AWS Signature V4.
//!   Tencent COS accepts this dialect, so it is the production backend.
//! - [`MemoryStorage`]: an in-process bucket with call accounting and
//!   fault injection, used to exercise the engine without a network.

pub mod memory;
pub mod s3;
mod sigv4;
mod xml;

use std::future::Future;
use std::pin::Pin;

pub use memory::{CallStats, Fault, MemoryStorage};
pub use s3::{S3Client, S3Config};

/// Boxed future returned by every [`ObjectStorage`] operation.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// A part that was uploaded successfully, as passed to
/// [`ObjectStorage::complete_multipart`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number.
    pub part_number: u32,
    /// Opaque tag returned by the backend for this part.
    pub etag: String,
}

/// Abstract object storage bucket.
///
/// Implementations must be shareable across tasks: the transfer engine calls
/// [`upload_part`](Self::upload_part) from several tasks at once.
pub trait ObjectStorage: Send + Sync {
    /// Opens a multipart session for `key` and returns its upload id.
    fn initiate_multipart<'a>(&'a self, key: &'a str) -> StorageFuture<'a, String>;

    /// Uploads one part and returns the backend's tag for it.
    fn upload_part<'a>(
        &'a self,
        key: &'a str,
        upload_id: &'a str,
        part_number: u32,
        data: Vec<u8>,
    ) -> StorageFuture<'a, String>;

    /// Finalizes the session. `parts` must be in ascending part order.
    fn complete_multipart<'a>(
        &'a self,
        key: &'a str,
        upload_id: &'a str,
        parts: &'a [CompletedPart],
    ) -> StorageFuture<'a, ()>;

    /// Discards the session and every part staged under it.
    fn abort_multipart<'a>(&'a self, key: &'a str, upload_id: &'a str) -> StorageFuture<'a, ()>;

    /// Stores `data` as `key` in one request with an explicit content length.
    fn put_object<'a>(
        &'a self,
        key: &'a str,
        data: Vec<u8>,
        content_length: u64,
    ) -> StorageFuture<'a, ()>;
}

/// Errors produced by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage API error {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("XML error: {0}")]
    Xml(String),

    #[error("response is missing the ETag header")]
    MissingEtag,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("content length {declared} does not match payload size {actual}")]
    LengthMismatch { declared: u64, actual: u64 },

    #[error("no such upload: {0}")]
    NoSuchUpload(String),

    #[error("invalid part list: {0}")]
    InvalidPart(String),

    #[error("injected fault: {0}")]
    Injected(String),
}
