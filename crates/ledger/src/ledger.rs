use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::LedgerError;

/// Set of transferred identifiers backed by an append-only file (thread-safe).
pub struct Ledger {
    path: PathBuf,
    inner: RwLock<LedgerInner>,
}

struct LedgerInner {
    done: HashSet<String>,
    /// Identifiers currently being transferred by some caller.
    reserved: HashSet<String>,
    /// The file's last line has no terminator (hand edit or torn write).
    unterminated: bool,
}

impl Ledger {
    /// Opens the ledger at `path`, loading every identifier it already lists.
    ///
    /// A missing file is an empty ledger; the file is created on the first
    /// [`mark_done`](Self::mark_done).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let (done, unterminated) = match File::open(&path) {
            Ok(file) => load(file)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "ledger file not found, starting empty");
                (HashSet::new(), false)
            }
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), entries = done.len(), "ledger loaded");

        Ok(Self {
            path,
            inner: RwLock::new(LedgerInner {
                done,
                reserved: HashSet::new(),
                unterminated,
            }),
        })
    }

    /// Returns `true` if `id` was recorded as transferred.
    pub fn contains(&self, id: &str) -> bool {
        self.read().done.contains(id)
    }

    /// Number of recorded identifiers.
    pub fn count(&self) -> usize {
        self.read().done.len()
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records `id` as transferred and appends it to the backing file.
    ///
    /// Idempotent: an identifier that is already recorded is not written
    /// again. If the append fails the error is returned, but the in-memory
    /// mark stays in place.
    pub fn mark_done(&self, id: &str) -> Result<(), LedgerError> {
        validate_id(id)?;
        let mut inner = self.write();
        inner.reserved.remove(id);
        if !inner.done.insert(id.to_string()) {
            return Ok(());
        }
        self.append(&mut inner, id)
    }

    /// Atomically checks for `id` and reserves it for the caller.
    ///
    /// Returns `None` if `id` is already recorded or reserved by someone
    /// else. The check and the reservation happen under one exclusive lock,
    /// so two callers can never both obtain a reservation for the same id.
    pub fn reserve(&self, id: &str) -> Result<Option<Reservation<'_>>, LedgerError> {
        validate_id(id)?;
        let mut inner = self.write();
        if inner.done.contains(id) || !inner.reserved.insert(id.to_string()) {
            return Ok(None);
        }
        Ok(Some(Reservation {
            ledger: self,
            id: Some(id.to_string()),
        }))
    }

    fn release(&self, id: &str) {
        self.write().reserved.remove(id);
    }

    fn append(&self, inner: &mut LedgerInner, id: &str) -> Result<(), LedgerError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = if inner.unterminated {
            format!("\n{id}\n")
        } else {
            format!("{id}\n")
        };
        file.write_all(line.as_bytes())?;
        inner.unterminated = false;
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive claim on an identifier, obtained from [`Ledger::reserve`].
///
/// Dropping the reservation without committing releases the identifier so a
/// later attempt can claim it again.
pub struct Reservation<'a> {
    ledger: &'a Ledger,
    id: Option<String>,
}

impl Reservation<'_> {
    /// The reserved identifier.
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Records the identifier as transferred, releasing the reservation.
    pub fn commit(mut self) -> Result<(), LedgerError> {
        match self.id.take() {
            Some(id) => self.ledger.mark_done(&id),
            None => Ok(()),
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.ledger.release(&id);
        }
    }
}

/// Returns the identifiers in `file` and whether its last line is unterminated.
fn load(mut file: File) -> Result<(HashSet<String>, bool), LedgerError> {
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    let unterminated = !content.is_empty() && !content.ends_with('\n');

    let mut done = HashSet::new();
    let mut duplicates = 0usize;
    for line in content.lines() {
        let id = line.trim_end_matches('\r');
        if id.trim().is_empty() {
            continue;
        }
        if !done.insert(id.to_string()) {
            duplicates += 1;
        }
    }
    if duplicates > 0 {
        warn!(duplicates, "ledger file contains duplicate entries");
    }
    Ok((done, unterminated))
}

fn validate_id(id: &str) -> Result<(), LedgerError> {
    if id.trim().is_empty() || id.contains(['\n', '\r']) {
        return Err(LedgerError::InvalidId(id.to_string()));
    }
    Ok(())
}
