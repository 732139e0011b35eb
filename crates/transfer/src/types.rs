use link2cos_storage::CompletedPart;

use crate::TransferError;

/// Lifecycle of a multipart session.
///
/// `Initiated -> PartsInFlight -> Completed | Aborted`; `Initiated` may also
/// go straight to `Aborted`. `Completed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initiated,
    PartsInFlight,
    Completed,
    Aborted,
}

/// What a part worker hands back to the collector.
#[derive(Debug)]
pub struct PartResult {
    pub index: u32,
    pub length: u64,
    /// Remote tag on success.
    pub outcome: Result<String, TransferError>,
}

/// A multipart session owned by the engine for one payload.
#[derive(Debug)]
pub struct UploadSession {
    upload_id: String,
    key: String,
    part_count: u32,
    parts: Vec<CompletedPart>,
    state: SessionState,
}

impl UploadSession {
    /// Creates a session for an upload id the backend just handed out.
    pub fn new(upload_id: impl Into<String>, key: impl Into<String>, part_count: u32) -> Self {
        Self {
            upload_id: upload_id.into(),
            key: key.into(),
            part_count,
            parts: Vec::with_capacity(part_count as usize),
            state: SessionState::Initiated,
        }
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn part_count(&self) -> u32 {
        self.part_count
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of parts recorded so far.
    pub fn uploaded_parts(&self) -> usize {
        self.parts.len()
    }

    /// Marks the start of part uploads.
    pub fn start_parts(&mut self) -> Result<(), TransferError> {
        self.transition(SessionState::PartsInFlight)
    }

    /// Records the remote tag of an uploaded part.
    pub fn record_part(&mut self, index: u32, etag: String) -> Result<(), TransferError> {
        if self.state != SessionState::PartsInFlight {
            return Err(TransferError::Session {
                from: self.state,
                to: SessionState::PartsInFlight,
            });
        }
        self.parts.push(CompletedPart {
            part_number: index,
            etag,
        });
        Ok(())
    }

    /// Returns the recorded parts in ascending order.
    ///
    /// Fails unless the parts are exactly `1..=part_count`, each once.
    pub fn completed_parts(&self) -> Result<Vec<CompletedPart>, TransferError> {
        let mut parts = self.parts.clone();
        parts.sort_by_key(|p| p.part_number);

        let exact = parts.len() == self.part_count as usize
            && parts
                .iter()
                .zip(1..)
                .all(|(part, expected)| part.part_number == expected);
        if !exact {
            let got: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
            return Err(TransferError::Worker(format!(
                "expected parts 1..={}, collected {got:?}",
                self.part_count
            )));
        }
        Ok(parts)
    }

    /// Marks the session as completed on the backend.
    pub fn complete(&mut self) -> Result<(), TransferError> {
        self.transition(SessionState::Completed)
    }

    /// Marks the session as aborted. Succeeds at most once.
    pub fn abort(&mut self) -> Result<(), TransferError> {
        self.transition(SessionState::Aborted)
    }

    fn transition(&mut self, to: SessionState) -> Result<(), TransferError> {
        use SessionState::*;

        let allowed = matches!(
            (self.state, to),
            (Initiated, PartsInFlight) | (PartsInFlight, Completed) | (Initiated | PartsInFlight, Aborted)
        );
        if !allowed {
            return Err(TransferError::Session {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}
