//! Data types for the sync flow.

/// Progress event emitted during a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// An item is about to be processed (`index` is 1-based).
    Started {
        id: String,
        index: usize,
        total: usize,
    },
    /// The item was already transferred.
    Skipped { id: String },
    /// The item was delivered and recorded.
    Completed {
        id: String,
        target: String,
        bytes: u64,
    },
    /// The item failed; the ledger was left untouched.
    Failed { id: String, error: String },
}

/// Where a payload ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Object key or local path.
    pub target: String,
    pub bytes: u64,
}

/// One failed item of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub id: String,
    pub error: String,
}

/// Tally of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
    /// Set when the batch stopped early on cancellation.
    pub cancelled: bool,
}

impl BatchReport {
    /// Number of items that were looked at.
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}
