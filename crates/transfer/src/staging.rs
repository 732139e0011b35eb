use std::path::Path;

use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::debug;

use crate::TransferError;

/// A streamed payload spooled to a temporary file.
///
/// The file is removed when the value is dropped, whatever the outcome of
/// the upload that reads it.
pub struct StagedPayload {
    file: NamedTempFile,
    size: u64,
}

impl StagedPayload {
    /// Copies `reader` into a new temporary file in `dir` (the system temp
    /// dir when `None`) and checks that exactly `expected` bytes arrived.
    pub async fn stage<R>(reader: &mut R, expected: u64, dir: Option<&Path>) -> Result<Self, TransferError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut builder = tempfile::Builder::new();
        builder.prefix("link2cos-").suffix(".part");
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        let mut out = tokio::fs::File::from_std(file.reopen()?);
        let written = tokio::io::copy(reader, &mut out).await?;
        out.flush().await?;

        if written != expected {
            return Err(TransferError::SizeMismatch {
                expected,
                actual: written,
            });
        }

        debug!(path = %file.path().display(), size = written, "payload staged");
        Ok(Self {
            file,
            size: written,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Moves the staged file to `target`, replacing any file already there.
    pub fn persist(self, target: &Path) -> Result<(), TransferError> {
        self.file.persist(target).map_err(|e| TransferError::Io(e.error))?;
        Ok(())
    }
}
