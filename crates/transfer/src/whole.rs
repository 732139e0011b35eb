use link2cos_storage::ObjectStorage;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::info;

use crate::{TransferError, validate_object_key};

/// Upper bound on the buffer reserved up front; the declared size is not
/// trusted for allocation.
const MAX_PREALLOCATION: usize = 8 * 1024 * 1024;

/// Reads exactly `size` bytes from `reader` into memory.
///
/// A stream that ends early or has bytes left over is a
/// [`TransferError::SizeMismatch`]; at most one byte past `size` is read.
pub async fn read_exact_size<R>(reader: &mut R, size: u64) -> Result<Vec<u8>, TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let capacity = usize::try_from(size).map_err(|_| {
        TransferError::InvalidConfig(format!("{size} bytes do not fit in memory"))
    })?;

    let mut data = Vec::with_capacity(capacity.min(MAX_PREALLOCATION));
    reader.take(size.saturating_add(1)).read_to_end(&mut data).await?;

    let actual = data.len() as u64;
    if actual != size {
        return Err(TransferError::SizeMismatch {
            expected: size,
            actual,
        });
    }
    Ok(data)
}

/// Uploads a payload of declared `size` in a single put.
///
/// The put is only issued once exactly `size` bytes were read, and it
/// carries `size` as its content length.
pub async fn upload_whole<R>(
    storage: &dyn ObjectStorage,
    key: &str,
    reader: &mut R,
    size: u64,
) -> Result<(), TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    validate_object_key(key)?;

    let data = read_exact_size(reader, size).await?;
    storage
        .put_object(key, data, size)
        .await
        .map_err(TransferError::Put)?;

    info!(key, size, "object uploaded");
    Ok(())
}
