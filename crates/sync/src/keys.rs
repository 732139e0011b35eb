//! Mapping from links to object keys.

use link2cos_transfer::{TransferError, validate_object_key};

use crate::SyncError;

/// Returns the object key for `link`: the link with `prefix` removed.
///
/// Leading slashes left after removing the prefix are dropped, so a prefix
/// with or without a trailing `/` maps to the same key.
pub fn key_for_link(prefix: &str, link: &str) -> Result<String, SyncError> {
    let key_error = |reason: String| SyncError::Key {
        link: link.to_string(),
        reason,
    };

    let relative = link
        .strip_prefix(prefix)
        .ok_or_else(|| key_error(format!("does not start with {prefix}")))?
        .trim_start_matches('/');

    validate_object_key(relative).map_err(|e| match e {
        TransferError::InvalidKey { reason, .. } => key_error(reason),
        other => key_error(other.to_string()),
    })?;
    Ok(relative.to_string())
}
