//! Size-adaptive object transfer.
//!
//! Small payloads go to the bucket in one `put_object`. Large payloads are
//! split into fixed-size parts and uploaded through a multipart session by
//! [`ChunkedUploader`], which runs a bounded pool of part workers and either
//! completes or aborts the session.

mod chunked;
mod engine;
mod progress;
mod staging;
mod strategy;
mod types;
mod validation;
mod whole;

use std::path::PathBuf;

use link2cos_storage::StorageError;

pub use chunked::{ChunkPlan, MAX_PARTS, PartSpec, read_part};
pub use engine::{ChunkedUploader, UploadReport};
pub use progress::SpeedCalculator;
pub use staging::StagedPayload;
pub use strategy::{Strategy, select};
pub use types::{PartResult, SessionState, UploadSession};
pub use validation::validate_object_key;
pub use whole::{read_exact_size, upload_whole};

/// Payloads of at least this many bytes are uploaded in parts: 100 MiB.
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Default part size: 10 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Default number of part uploads running at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Transfer tuning shared by the strategy selector and the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Size at and above which the chunked strategy is used.
    pub multipart_threshold: u64,
    /// Size of every part except possibly the last.
    pub chunk_size: u64,
    /// Upper bound on concurrent part uploads within one session.
    pub max_concurrency: usize,
    /// Directory for staged downloads; the system temp dir when `None`.
    pub staging_dir: Option<PathBuf>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            staging_dir: None,
        }
    }
}

impl TransferConfig {
    /// Rejects values the engine cannot work with.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.multipart_threshold == 0 {
            return Err(TransferError::InvalidConfig(
                "multipart_threshold must be greater than zero".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(TransferError::InvalidConfig(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if usize::try_from(self.chunk_size).is_err() {
            return Err(TransferError::InvalidConfig(format!(
                "chunk_size {} does not fit in memory",
                self.chunk_size
            )));
        }
        if self.max_concurrency == 0 {
            return Err(TransferError::InvalidConfig(
                "max_concurrency must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to initiate multipart upload: {0}")]
    SessionInitiate(#[source] StorageError),

    #[error("part {index} failed: {source}")]
    PartUpload {
        index: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to complete multipart upload: {0}")]
    Complete(#[source] StorageError),

    #[error("put failed: {0}")]
    Put(#[source] StorageError),

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("invalid transfer config: {0}")]
    InvalidConfig(String),

    #[error("illegal session transition: {from:?} -> {to:?}")]
    Session { from: SessionState, to: SessionState },

    #[error("part worker failed: {0}")]
    Worker(String),
}
