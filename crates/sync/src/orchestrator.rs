//! Sequential batch orchestrator.
//!
//! Processes items strictly one after another, publishes progress events
//! and stops between items when cancelled.

use std::sync::Arc;

use link2cos_fetch::{RemoteFetch, Source};
use link2cos_ledger::Ledger;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::destination::Destination;
use crate::types::{BatchReport, Delivery, ItemFailure, SyncEvent};
use crate::SyncError;

/// Capacity of the event channel. Events are dropped, never waited on,
/// when the receiver falls behind.
const EVENT_CAPACITY: usize = 256;

enum ItemOutcome {
    Skipped,
    Delivered(Delivery),
}

/// Runs batches of source identifiers into a [`Destination`].
pub struct SyncOrchestrator {
    ledger: Arc<Ledger>,
    fetcher: Arc<dyn RemoteFetch>,
    destination: Arc<dyn Destination>,
    events_tx: mpsc::Sender<SyncEvent>,
    events_rx: Option<mpsc::Receiver<SyncEvent>>,
    cancel: CancellationToken,
}

impl SyncOrchestrator {
    pub fn new(
        ledger: Arc<Ledger>,
        fetcher: Arc<dyn RemoteFetch>,
        destination: Arc<dyn Destination>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        Self {
            ledger,
            fetcher,
            destination,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.events_rx.take()
    }

    /// Returns the token that stops the batch before its next item.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Processes `ids` in order.
    ///
    /// Item failures are tallied and never stop the batch.
    pub async fn run(&self, ids: &[String]) -> BatchReport {
        let total = ids.len();
        let mut report = BatchReport::default();
        info!(total, done = self.ledger.count(), "batch started");

        for (i, id) in ids.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(remaining = total - i, "batch cancelled");
                report.cancelled = true;
                break;
            }

            self.emit(SyncEvent::Started {
                id: id.clone(),
                index: i + 1,
                total,
            });
            info!(item = i + 1, total, id = %id, "processing");

            match self.sync_one(id).await {
                Ok(ItemOutcome::Skipped) => {
                    info!(id = %id, "already transferred, skipping");
                    report.skipped += 1;
                    self.emit(SyncEvent::Skipped { id: id.clone() });
                }
                Ok(ItemOutcome::Delivered(delivery)) => {
                    info!(id = %id, target = %delivery.target, bytes = delivery.bytes, "transferred");
                    report.succeeded += 1;
                    self.emit(SyncEvent::Completed {
                        id: id.clone(),
                        target: delivery.target,
                        bytes: delivery.bytes,
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    error!(id = %id, error = %message, "transfer failed");
                    report.failed += 1;
                    report.failures.push(ItemFailure {
                        id: id.clone(),
                        error: message.clone(),
                    });
                    self.emit(SyncEvent::Failed {
                        id: id.clone(),
                        error: message,
                    });
                }
            }
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "batch finished"
        );
        report
    }

    async fn sync_one(&self, id: &str) -> Result<ItemOutcome, SyncError> {
        let Some(reservation) = self.ledger.reserve(id)? else {
            return Ok(ItemOutcome::Skipped);
        };

        let source = Source::parse(id).map_err(SyncError::Fetch)?;
        let size = source
            .size(&*self.fetcher)
            .await
            .map_err(SyncError::SizeDiscovery)?;
        debug!(id, size, remote = source.is_remote(), "size discovered");

        let delivery = self
            .destination
            .deliver(id, &source, size, &*self.fetcher)
            .await?;

        // The payload is already in place; a lost ledger line only means a
        // re-transfer on the next run.
        if let Err(e) = reservation.commit() {
            warn!(id, error = %e, "transferred but not recorded in the ledger");
        }
        Ok(ItemOutcome::Delivered(delivery))
    }

    fn emit(&self, event: SyncEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            debug!(error = %e, "sync event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use link2cos_fetch::{FetchError, FetchFuture, PayloadStream};
    use link2cos_storage::{Fault, MemoryStorage, ObjectStorage};
    use link2cos_transfer::TransferConfig;
    use tempfile::TempDir;

    use super::*;
    use crate::destination::{BucketDestination, DirectoryDestination};

    const PREFIX: &str = "https://mirror.example/files/";

    /// Serves payloads from memory; unknown links answer 404.
    #[derive(Default)]
    struct MockFetch {
        payloads: HashMap<String, Vec<u8>>,
        heads: AtomicUsize,
        gets: AtomicUsize,
    }

    impl MockFetch {
        fn with(self, name: &str, data: Vec<u8>) -> Self {
            self.with_url(&link(name), data)
        }

        fn with_url(mut self, url: &str, data: Vec<u8>) -> Self {
            self.payloads.insert(url.to_string(), data);
            self
        }
    }

    impl RemoteFetch for MockFetch {
        fn head<'a>(&'a self, url: &'a str) -> FetchFuture<'a, u64> {
            Box::pin(async move {
                self.heads.fetch_add(1, Ordering::SeqCst);
                self.payloads
                    .get(url)
                    .map(|d| d.len() as u64)
                    .ok_or(FetchError::Status(404))
            })
        }

        fn get<'a>(&'a self, url: &'a str) -> FetchFuture<'a, PayloadStream> {
            Box::pin(async move {
                self.gets.fetch_add(1, Ordering::SeqCst);
                let data = self.payloads.get(url).cloned().ok_or(FetchError::Status(404))?;
                Ok(Box::pin(Cursor::new(data)) as PayloadStream)
            })
        }
    }

    fn link(name: &str) -> String {
        format!("{PREFIX}{name}")
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    /// Whole-object below 20 bytes, 10-byte parts above.
    fn small_config(staging: &Path) -> TransferConfig {
        TransferConfig {
            multipart_threshold: 20,
            chunk_size: 10,
            max_concurrency: 3,
            staging_dir: Some(staging.to_path_buf()),
        }
    }

    struct Harness {
        _dir: TempDir,
        staging: std::path::PathBuf,
        ledger: Arc<Ledger>,
        storage: Arc<MemoryStorage>,
        fetch: Arc<MockFetch>,
        orchestrator: SyncOrchestrator,
    }

    fn harness(fetch: MockFetch) -> Harness {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("staging");
        std::fs::create_dir(&staging).unwrap();
        let ledger = Arc::new(Ledger::open(dir.path().join("ledger.txt")).unwrap());
        let storage = Arc::new(MemoryStorage::new());
        let fetch = Arc::new(fetch);

        let destination = BucketDestination::new(
            Arc::clone(&storage) as Arc<dyn ObjectStorage>,
            small_config(&staging),
            PREFIX,
        )
        .unwrap();
        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&ledger),
            Arc::clone(&fetch) as Arc<dyn RemoteFetch>,
            Arc::new(destination),
        );

        Harness {
            _dir: dir,
            staging,
            ledger,
            storage,
            fetch,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn empty_ledger_single_success() {
        let data = payload(5);
        let h = harness(MockFetch::default().with("a.bin", data.clone()));

        let report = h.orchestrator.run(&[link("a.bin")]).await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(h.ledger.count(), 1);
        assert!(h.ledger.contains(&link("a.bin")));
        assert_eq!(h.storage.object("a.bin").unwrap(), data);
        assert_eq!(h.storage.stats().put_lengths, vec![5]);
    }

    #[tokio::test]
    async fn done_items_are_skipped_without_fetching() {
        let h = harness(MockFetch::default().with("a.bin", payload(5)));
        h.ledger.mark_done(&link("a.bin")).unwrap();

        let report = h.orchestrator.run(&[link("a.bin")]).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.succeeded, 0);
        assert_eq!(h.fetch.heads.load(Ordering::SeqCst), 0);
        assert_eq!(h.storage.stats().put, 0);
    }

    #[tokio::test]
    async fn duplicate_in_batch_transfers_once() {
        let h = harness(MockFetch::default().with("a.bin", payload(5)));

        let report = h.orchestrator.run(&[link("a.bin"), link("a.bin")]).await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(h.storage.stats().put, 1);
    }

    #[tokio::test]
    async fn part_failure_is_tallied_and_not_recorded() {
        let h = harness(MockFetch::default().with("big.bin", payload(25)));
        h.storage.inject(Fault::Part(2));

        let report = h.orchestrator.run(&[link("big.bin")]).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failures[0].id, link("big.bin"));
        assert!(report.failures[0].error.contains("part 2"));

        let stats = h.storage.stats();
        assert_eq!(stats.abort, 1);
        assert_eq!(stats.complete, 0);
        assert_eq!(h.ledger.count(), 0);
        assert!(!h.ledger.contains(&link("big.bin")));
    }

    #[tokio::test]
    async fn large_remote_payload_is_staged_and_cleaned_up() {
        let data = payload(25);
        let h = harness(MockFetch::default().with("big.bin", data.clone()));

        let report = h.orchestrator.run(&[link("big.bin")]).await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(h.storage.object("big.bin").unwrap(), data);
        assert_eq!(h.storage.stats().upload_part, 3);
        assert_eq!(std::fs::read_dir(&h.staging).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_batch() {
        let h = harness(
            MockFetch::default()
                .with("b.bin", payload(3))
                .with_url("https://elsewhere.example/c.bin", payload(3)),
        );

        let ids = vec![
            link("missing.bin"),
            "https://elsewhere.example/c.bin".to_string(),
            link("b.bin"),
        ];
        let report = h.orchestrator.run(&ids).await;

        assert_eq!(report.failed, 2);
        assert_eq!(report.succeeded, 1);
        assert!(report.failures[0].error.contains("size discovery"));
        assert!(report.failures[1].error.contains("no object key"));
        assert_eq!(h.ledger.count(), 1);
        assert!(h.ledger.contains(&link("b.bin")));
    }

    #[tokio::test]
    async fn failed_item_can_be_retried() {
        let h = harness(MockFetch::default().with("a.bin", payload(5)));
        h.storage.inject(Fault::Put);

        let report = h.orchestrator.run(&[link("a.bin")]).await;
        assert_eq!(report.failed, 1);

        // The reservation was released, so a later pass tries again.
        let report = h.orchestrator.run(&[link("a.bin")]).await;
        assert_eq!(report.failed, 1);
        assert_eq!(h.storage.stats().put, 2);
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_item() {
        let h = harness(MockFetch::default().with("a.bin", payload(5)));
        h.orchestrator.cancel_token().cancel();

        let report = h.orchestrator.run(&[link("a.bin")]).await;

        assert!(report.cancelled);
        assert_eq!(report.processed(), 0);
        assert_eq!(h.fetch.heads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ledger_write_failure_still_counts_as_success() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(Ledger::open(dir.path().join("missing/ledger.txt")).unwrap());
        let storage = Arc::new(MemoryStorage::new());
        let fetch = Arc::new(MockFetch::default().with("a.bin", payload(5)));
        let destination = BucketDestination::new(
            Arc::clone(&storage) as Arc<dyn ObjectStorage>,
            small_config(dir.path()),
            PREFIX,
        )
        .unwrap();
        let orchestrator = SyncOrchestrator::new(Arc::clone(&ledger), fetch, Arc::new(destination));

        let report = orchestrator.run(&[link("a.bin")]).await;

        assert_eq!(report.succeeded, 1);
        assert!(ledger.contains(&link("a.bin")));
    }

    #[tokio::test]
    async fn events_follow_the_batch() {
        let mut h = harness(MockFetch::default().with("a.bin", payload(5)));
        h.ledger.mark_done(&link("done.bin")).unwrap();
        let mut events_rx = h.orchestrator.take_events().unwrap();

        h.orchestrator
            .run(&[link("done.bin"), link("a.bin"), link("nope.bin")])
            .await;
        drop(h.orchestrator);

        let mut events = Vec::new();
        while let Some(e) = events_rx.recv().await {
            events.push(e);
        }

        assert_eq!(events.len(), 6);
        assert_eq!(
            events[0],
            SyncEvent::Started {
                id: link("done.bin"),
                index: 1,
                total: 3
            }
        );
        assert!(matches!(events[1], SyncEvent::Skipped { .. }));
        assert_eq!(
            events[3],
            SyncEvent::Completed {
                id: link("a.bin"),
                target: "a.bin".into(),
                bytes: 5
            }
        );
        assert!(matches!(events[5], SyncEvent::Failed { .. }));
    }

    #[tokio::test]
    async fn take_events_once() {
        let mut h = harness(MockFetch::default());
        assert!(h.orchestrator.take_events().is_some());
        assert!(h.orchestrator.take_events().is_none());
    }

    #[tokio::test]
    async fn large_local_file_goes_straight_to_the_engine() {
        let h = harness(MockFetch::default());
        let local = h.staging.parent().unwrap().join("local.bin");
        let data = payload(42);
        std::fs::write(&local, &data).unwrap();

        let destination = BucketDestination::new(
            Arc::clone(&h.storage) as Arc<dyn ObjectStorage>,
            small_config(&h.staging),
            PREFIX,
        )
        .unwrap();
        let source = Source::Local(local);
        let delivery = destination
            .transfer("uploads/local.bin", &source, 42, &*h.fetch)
            .await
            .unwrap();

        assert_eq!(delivery.target, "uploads/local.bin");
        assert_eq!(h.storage.object("uploads/local.bin").unwrap(), data);
        assert_eq!(h.storage.stats().upload_part, 5);
        assert_eq!(h.fetch.gets.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(&h.staging).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn directory_destination_saves_by_file_name() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("downloads");
        let ledger = Arc::new(Ledger::open(dir.path().join("ledger.txt")).unwrap());
        let data = payload(30);
        let fetch = Arc::new(MockFetch::default().with("nested/model.bin", data.clone()));
        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&ledger),
            fetch,
            Arc::new(DirectoryDestination::new(&out)),
        );

        let report = orchestrator.run(&[link("nested/model.bin")]).await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(std::fs::read(out.join("model.bin")).unwrap(), data);
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 1);
        assert_eq!(ledger.count(), 1);
    }
}
