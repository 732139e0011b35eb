use crate::TransferConfig;

/// How a payload of known size is transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Read fully into memory and sent in one put.
    WholeObject,
    /// Uploaded in parts through a multipart session.
    Chunked {
        chunk_size: u64,
        max_concurrency: usize,
    },
}

/// Picks the strategy for a payload of `size` bytes.
///
/// Sizes strictly below the threshold use [`Strategy::WholeObject`].
pub fn select(size: u64, config: &TransferConfig) -> Strategy {
    if size < config.multipart_threshold {
        Strategy::WholeObject
    } else {
        Strategy::Chunked {
            chunk_size: config.chunk_size,
            max_concurrency: config.max_concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn below_threshold_is_whole_object() {
        let config = TransferConfig::default();
        assert_eq!(select(0, &config), Strategy::WholeObject);
        assert_eq!(select(99 * MIB, &config), Strategy::WholeObject);
        assert_eq!(select(100 * MIB - 1, &config), Strategy::WholeObject);
    }

    #[test]
    fn threshold_and_above_is_chunked() {
        let config = TransferConfig::default();
        let chunked = Strategy::Chunked {
            chunk_size: 10 * MIB,
            max_concurrency: 5,
        };
        assert_eq!(select(100 * MIB, &config), chunked);
        assert_eq!(select(10 * 1024 * MIB, &config), chunked);
    }

    #[test]
    fn follows_configured_values() {
        let config = TransferConfig {
            multipart_threshold: 20,
            chunk_size: 10,
            max_concurrency: 2,
            staging_dir: None,
        };
        assert_eq!(select(19, &config), Strategy::WholeObject);
        assert_eq!(
            select(25, &config),
            Strategy::Chunked {
                chunk_size: 10,
                max_concurrency: 2
            }
        );
    }
}
