//! HTTP(S) fetch client.

use std::time::Duration;

use futures_util::TryStreamExt;
use reqwest::header::CONTENT_LENGTH;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use crate::{FetchConfig, FetchError, FetchFuture, PayloadStream, RemoteFetch};

/// Fetches payloads over HTTP(S) with `reqwest`.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    /// Builds a client from `config`.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90));

        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
            let p = reqwest::Proxy::all(proxy).map_err(|e| FetchError::InvalidProxy {
                proxy: proxy.to_string(),
                reason: e.to_string(),
            })?;
            builder = builder.proxy(p);
            info!(proxy, "fetching through proxy");
        }

        Ok(Self {
            http: builder.build()?,
        })
    }

    async fn content_length(&self, url: &str) -> Result<u64, FetchError> {
        let resp = self.http.head(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        // Read the header directly: the body of a HEAD response is empty, so
        // its size hint says nothing about the payload.
        let size = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or(FetchError::MissingContentLength)?;

        debug!(url, size, "remote size discovered");
        Ok(size)
    }

    async fn open(&self, url: &str) -> Result<PayloadStream, FetchError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let stream = resp.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }
}

impl RemoteFetch for HttpFetcher {
    fn head<'a>(&'a self, url: &'a str) -> FetchFuture<'a, u64> {
        Box::pin(self.content_length(url))
    }

    fn get<'a>(&'a self, url: &'a str) -> FetchFuture<'a, PayloadStream> {
        Box::pin(self.open(url))
    }
}
