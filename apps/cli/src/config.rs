//! Configuration file handling.
//!
//! Configuration is stored as TOML:
//!
//! ```toml
//! [storage]
//! secret_id = "AKID..."
//! secret_key = "..."
//! bucket = "models-1250000000"
//! region = "ap-guangzhou"
//! url_prefix = "https://huggingface.co/org/repo/resolve/main/"
//!
//! [fetch]
//! proxy = "http://127.0.0.1:7890"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use link2cos_fetch::{DEFAULT_FETCH_TIMEOUT, FetchConfig};
use link2cos_storage::S3Config;
use link2cos_transfer::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CONCURRENCY, DEFAULT_MULTIPART_THRESHOLD, TransferConfig,
};
use serde::Deserialize;

/// Configuration file used when `-c` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub transfer: TransferSection,
}

/// Bucket credentials and addressing.
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub secret_id: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    /// Overrides the COS endpoint derived from bucket and region.
    pub endpoint: Option<String>,
    /// Removed from each link to form its object key.
    pub url_prefix: String,
}

impl std::fmt::Debug for StorageSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSection")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("url_prefix", &self.url_prefix)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSection {
    /// Proxy for fetching links; uploads never use it.
    pub proxy: Option<String>,
    pub timeout_secs: u64,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferSection {
    pub multipart_threshold: u64,
    pub chunk_size: u64,
    pub max_concurrency: usize,
    pub staging_dir: Option<PathBuf>,
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            staging_dir: None,
        }
    }
}

impl Config {
    /// Loads configuration from `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Bucket connection settings; fails naming the first missing field.
    pub fn s3_config(&self) -> anyhow::Result<S3Config> {
        let s = &self.storage;
        require("storage.secret_id", &s.secret_id)?;
        require("storage.secret_key", &s.secret_key)?;
        require("storage.bucket", &s.bucket)?;
        require("storage.region", &s.region)?;

        let mut config = S3Config::cos(&s.bucket, &s.region, &s.secret_id, &s.secret_key);
        if let Some(endpoint) = s.endpoint.as_deref().filter(|e| !e.is_empty()) {
            config.endpoint = endpoint.to_string();
        }
        Ok(config)
    }

    pub fn url_prefix(&self) -> anyhow::Result<&str> {
        require("storage.url_prefix", &self.storage.url_prefix)?;
        Ok(&self.storage.url_prefix)
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            proxy: self.fetch.proxy.clone().filter(|p| !p.is_empty()),
            timeout: Duration::from_secs(self.fetch.timeout_secs),
        }
    }

    pub fn transfer_config(&self) -> anyhow::Result<TransferConfig> {
        let t = &self.transfer;
        let config = TransferConfig {
            multipart_threshold: t.multipart_threshold,
            chunk_size: t.chunk_size,
            max_concurrency: t.max_concurrency,
            staging_dir: t.staging_dir.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

fn require(field: &str, value: &str) -> anyhow::Result<()> {
    if value.trim().is_empty() {
        bail!("config is missing required field: {field}");
    }
    Ok(())
}
