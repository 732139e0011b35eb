//! Persisted record of source identifiers that were already transferred.
//!
//! The backing file holds one identifier per line and is only ever appended
//! to. Re-running a batch against the same file skips every identifier it
//! already lists, which is what makes repeated runs safe.

mod ledger;

pub use ledger::{Ledger, Reservation};

/// Ledger file used when none is configured.
pub const DEFAULT_LEDGER_FILE: &str = ".link2cos_downloaded.txt";

/// Errors produced by the ledger crate.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid identifier: {0:?}")]
    InvalidId(String),
}
