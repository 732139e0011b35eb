//! Chunked multipart upload engine.

use std::path::Path;
use std::sync::Arc;

use link2cos_storage::ObjectStorage;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::progress::PartProgress;
use crate::types::{PartResult, UploadSession};
use crate::{ChunkPlan, PartSpec, TransferConfig, TransferError, read_part, validate_object_key};

/// Outcome of a completed multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub upload_id: String,
    pub part_count: u32,
    pub bytes: u64,
}

/// Uploads a file in parts with a bounded number of concurrent part uploads.
///
/// Once any part fails no further parts are started, but parts already in
/// flight run to completion. A failed session is aborted exactly once.
pub struct ChunkedUploader {
    storage: Arc<dyn ObjectStorage>,
    chunk_size: u64,
    max_concurrency: usize,
}

impl ChunkedUploader {
    pub fn new(storage: Arc<dyn ObjectStorage>, config: &TransferConfig) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(Self {
            storage,
            chunk_size: config.chunk_size,
            max_concurrency: config.max_concurrency,
        })
    }

    /// Uploads the `size`-byte file at `path` to `key`.
    ///
    /// The file must not change while the upload runs: every part worker
    /// opens it independently.
    pub async fn upload(&self, key: &str, path: &Path, size: u64) -> Result<UploadReport, TransferError> {
        validate_object_key(key)?;

        let actual = tokio::fs::metadata(path).await?.len();
        if actual != size {
            return Err(TransferError::SizeMismatch {
                expected: size,
                actual,
            });
        }

        let plan = ChunkPlan::new(size, self.chunk_size)?;
        if plan.part_count() == 0 {
            return Err(TransferError::InvalidConfig(
                "an empty payload cannot be uploaded in parts".into(),
            ));
        }

        let upload_id = self
            .storage
            .initiate_multipart(key)
            .await
            .map_err(TransferError::SessionInitiate)?;
        info!(
            key,
            upload_id = %upload_id,
            parts = plan.part_count(),
            size,
            "multipart upload initiated"
        );

        let mut session = UploadSession::new(upload_id, key, plan.part_count());
        match self.run(&mut session, path, &plan).await {
            Ok(()) => Ok(UploadReport {
                upload_id: session.upload_id().to_string(),
                part_count: plan.part_count(),
                bytes: size,
            }),
            Err(e) => {
                self.abort(&mut session).await;
                Err(e)
            }
        }
    }

    async fn run(&self, session: &mut UploadSession, path: &Path, plan: &ChunkPlan) -> Result<(), TransferError> {
        session.start_parts()?;
        self.upload_parts(session, path, plan).await?;

        let parts = session.completed_parts()?;
        self.storage
            .complete_multipart(session.key(), session.upload_id(), &parts)
            .await
            .map_err(TransferError::Complete)?;
        session.complete()?;

        info!(
            key = session.key(),
            upload_id = session.upload_id(),
            parts = session.uploaded_parts(),
            "multipart upload completed"
        );
        Ok(())
    }

    /// Fans parts out to workers and collects every dispatched result.
    async fn upload_parts(
        &self,
        session: &mut UploadSession,
        path: &Path,
        plan: &ChunkPlan,
    ) -> Result<(), TransferError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let key: Arc<str> = Arc::from(session.key());
        let upload_id: Arc<str> = Arc::from(session.upload_id());
        let path: Arc<Path> = Arc::from(path);

        let mut tasks = JoinSet::new();
        let mut collector = Collector::new(plan);

        for part in plan.parts() {
            // Finished parts are drained while waiting so a failure stops
            // dispatch as early as possible.
            let permit = loop {
                tokio::select! {
                    biased;
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        collector.collect(session, joined);
                    }
                    permit = Arc::clone(&semaphore).acquire_owned() => break permit.ok(),
                }
            };
            let Some(permit) = permit else {
                collector.worker_failed("part semaphore closed".into());
                break;
            };
            if collector.failed() {
                debug!(key = %key, part = part.index, "not starting part after failure");
                break;
            }

            let storage = Arc::clone(&self.storage);
            let key = Arc::clone(&key);
            let upload_id = Arc::clone(&upload_id);
            let path = Arc::clone(&path);
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = upload_part(&*storage, &key, &upload_id, &path, &part).await;
                PartResult {
                    index: part.index,
                    length: part.length,
                    outcome,
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            collector.collect(session, joined);
        }

        collector.finish()
    }

    /// Best-effort abort; errors are logged, never returned.
    async fn abort(&self, session: &mut UploadSession) {
        if let Err(e) = session.abort() {
            warn!(key = session.key(), error = %e, "session not aborted");
            return;
        }

        match self
            .storage
            .abort_multipart(session.key(), session.upload_id())
            .await
        {
            Ok(()) => info!(
                key = session.key(),
                upload_id = session.upload_id(),
                "multipart upload aborted"
            ),
            Err(e) => warn!(
                key = session.key(),
                upload_id = session.upload_id(),
                error = %e,
                "abort failed, uploaded parts may remain in the bucket"
            ),
        }
    }
}

async fn upload_part(
    storage: &dyn ObjectStorage,
    key: &str,
    upload_id: &str,
    path: &Path,
    part: &PartSpec,
) -> Result<String, TransferError> {
    let data = read_part(path, part)
        .await
        .map_err(|e| TransferError::PartUpload {
            index: part.index,
            source: Box::new(e),
        })?;

    debug!(key, part = part.index, bytes = data.len(), "uploading part");
    storage
        .upload_part(key, upload_id, part.index, data)
        .await
        .map_err(|e| TransferError::PartUpload {
            index: part.index,
            source: Box::new(e),
        })
}

/// Fan-in side of [`ChunkedUploader::upload_parts`].
struct Collector {
    failures: Vec<(u32, TransferError)>,
    worker_error: Option<String>,
    progress: PartProgress,
}

impl Collector {
    fn new(plan: &ChunkPlan) -> Self {
        Self {
            failures: Vec::new(),
            worker_error: None,
            progress: PartProgress::new(plan),
        }
    }

    fn failed(&self) -> bool {
        !self.failures.is_empty() || self.worker_error.is_some()
    }

    fn worker_failed(&mut self, reason: String) {
        self.worker_error.get_or_insert(reason);
    }

    fn collect(&mut self, session: &mut UploadSession, joined: Result<PartResult, JoinError>) {
        let result = match joined {
            Ok(result) => result,
            Err(e) => {
                warn!(key = session.key(), error = %e, "part worker died");
                self.worker_failed(e.to_string());
                return;
            }
        };

        match result.outcome {
            Ok(etag) => match session.record_part(result.index, etag) {
                Ok(()) => self
                    .progress
                    .part_done(session.key(), result.index, result.length),
                Err(e) => self.failures.push((result.index, e)),
            },
            Err(e) => {
                warn!(key = session.key(), part = result.index, error = %e, "part upload failed");
                self.failures.push((result.index, e));
            }
        }
    }

    /// Reports the lowest failing part, if any.
    fn finish(self) -> Result<(), TransferError> {
        if let Some((_, err)) = self.failures.into_iter().min_by_key(|(index, _)| *index) {
            return Err(err);
        }
        match self.worker_error {
            Some(reason) => Err(TransferError::Worker(reason)),
            None => Ok(()),
        }
    }
}
