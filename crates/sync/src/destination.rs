//! Where payloads are delivered.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use link2cos_fetch::{RemoteFetch, Source};
use link2cos_storage::ObjectStorage;
use link2cos_transfer::{
    ChunkedUploader, StagedPayload, Strategy, TransferConfig, select, upload_whole,
};
use tracing::{debug, info};

use crate::keys::key_for_link;
use crate::{Delivery, SyncError};

/// Boxed future returned by [`Destination::deliver`].
pub type DeliverFuture<'a> = Pin<Box<dyn Future<Output = Result<Delivery, SyncError>> + Send + 'a>>;

/// Target of a sync batch.
///
/// The orchestrator owns the ledger and size discovery; a destination
/// moves one payload of known size.
pub trait Destination: Send + Sync {
    fn deliver<'a>(
        &'a self,
        id: &'a str,
        source: &'a Source,
        size: u64,
        fetcher: &'a dyn RemoteFetch,
    ) -> DeliverFuture<'a>;
}

/// Object storage bucket, choosing whole-object or chunked transfer by size.
pub struct BucketDestination {
    storage: Arc<dyn ObjectStorage>,
    uploader: ChunkedUploader,
    config: TransferConfig,
    url_prefix: String,
}

impl BucketDestination {
    /// `url_prefix` is removed from each link to form its object key.
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        config: TransferConfig,
        url_prefix: impl Into<String>,
    ) -> Result<Self, SyncError> {
        let uploader = ChunkedUploader::new(Arc::clone(&storage), &config)?;
        Ok(Self {
            storage,
            uploader,
            config,
            url_prefix: url_prefix.into(),
        })
    }

    /// Transfers `source` to `key`.
    ///
    /// Large remote payloads are staged to a temporary file first so that
    /// part workers can read their ranges independently; large local files
    /// are read in place.
    pub async fn transfer(
        &self,
        key: &str,
        source: &Source,
        size: u64,
        fetcher: &dyn RemoteFetch,
    ) -> Result<Delivery, SyncError> {
        let strategy = select(size, &self.config);
        info!(key, size, ?strategy, "transferring");

        match strategy {
            Strategy::WholeObject => {
                let mut stream = source.open(fetcher).await.map_err(SyncError::Fetch)?;
                upload_whole(&*self.storage, key, &mut stream, size).await?;
            }
            Strategy::Chunked {
                chunk_size,
                max_concurrency,
            } => match source.local_path() {
                Some(path) => {
                    debug!(key, chunk_size, max_concurrency, path = %path.display(), "uploading in place");
                    self.uploader.upload(key, path, size).await?;
                }
                None => {
                    let mut stream = source.open(fetcher).await.map_err(SyncError::Fetch)?;
                    let staged =
                        StagedPayload::stage(&mut stream, size, self.config.staging_dir.as_deref())
                            .await?;
                    debug!(key, chunk_size, max_concurrency, path = %staged.path().display(), "uploading staged payload");
                    self.uploader.upload(key, staged.path(), staged.size()).await?;
                }
            },
        }

        Ok(Delivery {
            target: key.to_string(),
            bytes: size,
        })
    }
}

impl Destination for BucketDestination {
    fn deliver<'a>(
        &'a self,
        id: &'a str,
        source: &'a Source,
        size: u64,
        fetcher: &'a dyn RemoteFetch,
    ) -> DeliverFuture<'a> {
        Box::pin(async move {
            let key = key_for_link(&self.url_prefix, id)?;
            self.transfer(&key, source, size, fetcher).await
        })
    }
}

/// Local directory; each payload is saved under its last path segment.
pub struct DirectoryDestination {
    dir: PathBuf,
}

impl DirectoryDestination {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn save(
        &self,
        source: &Source,
        size: u64,
        fetcher: &dyn RemoteFetch,
    ) -> Result<Delivery, SyncError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.dir.join(source.file_name());

        let mut stream = source.open(fetcher).await.map_err(SyncError::Fetch)?;
        // Staged next to the target so the final rename stays on one filesystem.
        let staged = StagedPayload::stage(&mut stream, size, Some(&self.dir)).await?;
        staged.persist(&target)?;

        info!(path = %target.display(), size, "saved");
        Ok(Delivery {
            target: target.display().to_string(),
            bytes: size,
        })
    }
}

impl Destination for DirectoryDestination {
    fn deliver<'a>(
        &'a self,
        _id: &'a str,
        source: &'a Source,
        size: u64,
        fetcher: &'a dyn RemoteFetch,
    ) -> DeliverFuture<'a> {
        Box::pin(self.save(source, size, fetcher))
    }
}
