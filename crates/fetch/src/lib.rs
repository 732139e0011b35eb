//! Remote payload fetching.
//!
//! [`RemoteFetch`] discovers the size of a remote payload and opens it as a
//! byte stream. [`HttpFetcher`] implements it over HTTP(S) with an optional
//! proxy, which is how payloads hosted abroad are usually reached.
//! [`Source`] puts remote links and local files behind one interface.

mod http;
mod source;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::AsyncRead;

pub use http::HttpFetcher;
pub use source::Source;

/// Default timeout for one fetch request, body included.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Streaming body of a fetched payload.
pub type PayloadStream = Pin<Box<dyn AsyncRead + Send>>;

/// Boxed future returned by [`RemoteFetch`] operations.
pub type FetchFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send + 'a>>;

/// Abstract remote fetch client.
pub trait RemoteFetch: Send + Sync {
    /// Returns the declared size of the payload at `url` in bytes.
    fn head<'a>(&'a self, url: &'a str) -> FetchFuture<'a, u64>;

    /// Opens the payload at `url` as a byte stream.
    fn get<'a>(&'a self, url: &'a str) -> FetchFuture<'a, PayloadStream>;
}

/// Settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Proxy URL applied to every fetch, e.g. `http://127.0.0.1:7890`.
    pub proxy: Option<String>,
    /// Timeout for one request, body included.
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Errors produced by fetch clients.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("response has no usable Content-Length")]
    MissingContentLength,

    #[error("invalid proxy {proxy}: {reason}")]
    InvalidProxy { proxy: String, reason: String },

    #[error("invalid source {0:?}")]
    InvalidSource(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
