use std::io::SeekFrom;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::TransferError;

/// Most parts a multipart session accepts.
pub const MAX_PARTS: u32 = 10_000;

/// One contiguous byte range of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpec {
    /// 1-based part number.
    pub index: u32,
    /// Byte offset within the payload.
    pub offset: u64,
    /// Length of this part in bytes.
    pub length: u64,
}

/// Split of a payload into fixed-size parts.
///
/// Parts are numbered `1..=N` with `N = ceil(total / chunk)`; every part but
/// the last is exactly `chunk_size` bytes and together they cover
/// `[0, total_size)` without overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
    part_count: u32,
}

impl ChunkPlan {
    pub fn new(total_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidConfig(
                "chunk_size must be greater than zero".into(),
            ));
        }

        let count = total_size.div_ceil(chunk_size);
        let part_count = u32::try_from(count)
            .ok()
            .filter(|&n| n <= MAX_PARTS)
            .ok_or_else(|| {
                TransferError::InvalidConfig(format!(
                    "{total_size} bytes in {chunk_size}-byte parts needs {count} parts, more than {MAX_PARTS}"
                ))
            })?;

        Ok(Self {
            total_size,
            chunk_size,
            part_count,
        })
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn part_count(&self) -> u32 {
        self.part_count
    }

    /// Returns part `index` (1-based), or `None` if out of range.
    pub fn part(&self, index: u32) -> Option<PartSpec> {
        if index == 0 || index > self.part_count {
            return None;
        }
        let offset = u64::from(index - 1) * self.chunk_size;
        let length = self.chunk_size.min(self.total_size - offset);
        Some(PartSpec {
            index,
            offset,
            length,
        })
    }

    /// Iterates over all parts in ascending order.
    pub fn parts(&self) -> impl Iterator<Item = PartSpec> + '_ {
        (1..=self.part_count).filter_map(|i| self.part(i))
    }
}

/// Reads exactly the bytes of `part` from the file at `path`.
///
/// Opens its own handle, so concurrent readers never share a cursor.
pub async fn read_part(path: &Path, part: &PartSpec) -> std::io::Result<Vec<u8>> {
    let len = usize::try_from(part.length).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("part {} is too large to buffer", part.index),
        )
    })?;

    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(part.offset)).await?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}
