//! Batch transfer orchestration.
//!
//! Runs an ordered list of source identifiers through one sequential pass:
//!
//! 1. **Reserve** the identifier in the ledger (skip if already done)
//! 2. **Size**: HEAD the link or stat the local file
//! 3. **Deliver** to a [`Destination`]: whole-object put, chunked upload
//!    (staging remote streams to disk first) or a local directory
//! 4. **Commit** the identifier to the ledger on success

pub mod destination;
pub mod error;
pub mod input;
pub mod keys;
pub mod orchestrator;
pub mod types;

pub use destination::{BucketDestination, Destination, DirectoryDestination};
pub use error::SyncError;
pub use input::{parse_links, read_links};
pub use keys::key_for_link;
pub use orchestrator::SyncOrchestrator;
pub use types::{BatchReport, Delivery, ItemFailure, SyncEvent};
