//! Sync error types.

use link2cos_fetch::FetchError;
use link2cos_ledger::LedgerError;
use link2cos_transfer::TransferError;

/// Errors produced while syncing one item.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("size discovery failed: {0}")]
    SizeDiscovery(#[source] FetchError),

    #[error("fetch failed: {0}")]
    Fetch(#[source] FetchError),

    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("no object key for {link}: {reason}")]
    Key { link: String, reason: String },

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}
