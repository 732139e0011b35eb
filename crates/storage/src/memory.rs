//! In-process object storage.
//!
//! Keeps objects and staged parts in memory, counts every call, records the
//! peak number of concurrent part uploads and can be told to fail specific
//! operations. The transfer engine and orchestrator tests run against it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::{CompletedPart, ObjectStorage, StorageError, StorageFuture};

/// Operation that [`MemoryStorage`] should fail on request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fault {
    Initiate,
    /// Fails the upload of this 1-based part number.
    Part(u32),
    Complete,
    Abort,
    Put,
}

/// Number of calls made against a [`MemoryStorage`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStats {
    pub initiate: usize,
    pub upload_part: usize,
    pub complete: usize,
    pub abort: usize,
    pub put: usize,
    /// Content length of every `put_object` call, in call order.
    pub put_lengths: Vec<u64>,
}

/// In-memory bucket (thread-safe).
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryInner>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    part_delay: Option<Duration>,
}

#[derive(Default)]
struct MemoryInner {
    objects: HashMap<String, Vec<u8>>,
    uploads: HashMap<String, PendingUpload>,
    faults: HashSet<Fault>,
    stats: CallStats,
    next_upload: u64,
}

struct PendingUpload {
    key: String,
    /// part number -> (etag, data)
    parts: BTreeMap<u32, (String, Vec<u8>)>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every part upload sleep for `delay`, so that concurrent uploads
    /// overlap long enough to be observed.
    pub fn with_part_delay(mut self, delay: Duration) -> Self {
        self.part_delay = Some(delay);
        self
    }

    /// Makes the given operation fail from now on.
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.insert(fault);
    }

    /// Returns a stored object.
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(key).cloned()
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Number of multipart sessions neither completed nor aborted.
    pub fn pending_uploads(&self) -> usize {
        self.lock().uploads.len()
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> CallStats {
        self.lock().stats.clone()
    }

    /// Highest number of part uploads observed running at the same time.
    pub fn peak_concurrent_parts(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn initiate(&self, key: &str) -> Result<String, StorageError> {
        let mut inner = self.lock();
        inner.stats.initiate += 1;
        if inner.faults.contains(&Fault::Initiate) {
            return Err(StorageError::Injected("initiate".into()));
        }
        inner.next_upload += 1;
        let upload_id = format!("mem-{}-{}", inner.next_upload, uuid::Uuid::new_v4());
        inner.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Vec<u8>,
    ) -> Result<String, StorageError> {
        let _in_flight = InFlight::enter(self);

        if let Some(delay) = self.part_delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.lock();
        inner.stats.upload_part += 1;
        if inner.faults.contains(&Fault::Part(part_number)) {
            return Err(StorageError::Injected(format!("part {part_number}")));
        }
        let upload = session(&mut inner, key, upload_id)?;
        let etag = format!("\"{}\"", hex::encode(&Sha256::digest(&data)[..16]));
        upload.parts.insert(part_number, (etag.clone(), data));
        Ok(etag)
    }

    fn complete(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.stats.complete += 1;
        if inner.faults.contains(&Fault::Complete) {
            return Err(StorageError::Injected("complete".into()));
        }
        let upload = session(&mut inner, key, upload_id)?;

        let mut object = Vec::new();
        let mut previous = 0u32;
        for part in parts {
            if part.part_number <= previous {
                return Err(StorageError::InvalidPart(format!(
                    "part {} listed after part {previous}",
                    part.part_number
                )));
            }
            previous = part.part_number;
            match upload.parts.get(&part.part_number) {
                Some((etag, data)) if *etag == part.etag => object.extend_from_slice(data),
                Some(_) => {
                    return Err(StorageError::InvalidPart(format!(
                        "etag mismatch for part {}",
                        part.part_number
                    )));
                }
                None => {
                    return Err(StorageError::InvalidPart(format!(
                        "part {} was never uploaded",
                        part.part_number
                    )));
                }
            }
        }

        inner.uploads.remove(upload_id);
        inner.objects.insert(key.to_string(), object);
        Ok(())
    }

    fn abort(&self, key: &str, upload_id: &str) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.stats.abort += 1;
        if inner.faults.contains(&Fault::Abort) {
            return Err(StorageError::Injected("abort".into()));
        }
        session(&mut inner, key, upload_id)?;
        inner.uploads.remove(upload_id);
        Ok(())
    }

    fn put(&self, key: &str, data: Vec<u8>, content_length: u64) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.stats.put += 1;
        inner.stats.put_lengths.push(content_length);
        if inner.faults.contains(&Fault::Put) {
            return Err(StorageError::Injected("put".into()));
        }
        let actual = data.len() as u64;
        if actual != content_length {
            return Err(StorageError::LengthMismatch {
                declared: content_length,
                actual,
            });
        }
        inner.objects.insert(key.to_string(), data);
        Ok(())
    }
}

fn session<'a>(
    inner: &'a mut MemoryInner,
    key: &str,
    upload_id: &str,
) -> Result<&'a mut PendingUpload, StorageError> {
    match inner.uploads.get_mut(upload_id) {
        Some(upload) if upload.key == key => Ok(upload),
        _ => Err(StorageError::NoSuchUpload(upload_id.to_string())),
    }
}

/// Tracks one running part upload for the peak-concurrency gauge.
struct InFlight<'a> {
    storage: &'a MemoryStorage,
}

impl<'a> InFlight<'a> {
    fn enter(storage: &'a MemoryStorage) -> Self {
        let now = storage.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        storage.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self { storage }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.storage.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ObjectStorage for MemoryStorage {
    fn initiate_multipart<'a>(&'a self, key: &'a str) -> StorageFuture<'a, String> {
        Box::pin(async move { self.initiate(key) })
    }

    fn upload_part<'a>(
        &'a self,
        key: &'a str,
        upload_id: &'a str,
        part_number: u32,
        data: Vec<u8>,
    ) -> StorageFuture<'a, String> {
        Box::pin(self.part(key, upload_id, part_number, data))
    }

    fn complete_multipart<'a>(
        &'a self,
        key: &'a str,
        upload_id: &'a str,
        parts: &'a [CompletedPart],
    ) -> StorageFuture<'a, ()> {
        Box::pin(async move { self.complete(key, upload_id, parts) })
    }

    fn abort_multipart<'a>(&'a self, key: &'a str, upload_id: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(async move { self.abort(key, upload_id) })
    }

    fn put_object<'a>(
        &'a self,
        key: &'a str,
        data: Vec<u8>,
        content_length: u64,
    ) -> StorageFuture<'a, ()> {
        Box::pin(async move { self.put(key, data, content_length) })
    }
}
