//! S3-compatible object storage client.
//!
//! Async HTTP client using `reqwest`, signing every request with AWS
//! Signature V4. Addressing is virtual-hosted: the endpoint URL already names
//! the bucket (`https://{bucket}.cos.{region}.myqcloud.com` for COS).

use std::time::Duration;

use chrono::Utc;
use reqwest::header::{AUTHORIZATION, ETAG};
use reqwest::{Method, Response, Url};
use tracing::{debug, trace};

use crate::sigv4::{self, Credentials, SigningRequest};
use crate::xml;
use crate::{CompletedPart, ObjectStorage, StorageError, StorageFuture};

/// Default timeout for a single storage request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const SERVICE: &str = "s3";

/// Connection settings for [`S3Client`].
#[derive(Clone)]
pub struct S3Config {
    /// Bucket endpoint, e.g. `https://examplebucket-1250000000.cos.ap-guangzhou.myqcloud.com`.
    pub endpoint: String,
    /// Signing region, e.g. `ap-guangzhou`.
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Per-request timeout enforced by the HTTP client.
    pub timeout: Duration,
}

impl S3Config {
    /// Settings for a Tencent COS bucket, deriving the endpoint from
    /// `bucket` and `region`.
    pub fn cos(bucket: &str, region: &str, access_key: &str, secret_key: &str) -> Self {
        Self {
            endpoint: format!("https://{bucket}.cos.{region}.myqcloud.com"),
            region: region.to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// S3-compatible bucket client.
pub struct S3Client {
    http: reqwest::Client,
    /// `scheme://host[:port]` of the endpoint.
    origin: String,
    /// Value of the `host` header.
    host: String,
    /// Path prefix of the endpoint, without trailing slash.
    base_path: String,
    region: String,
    creds: Credentials,
}

impl S3Client {
    /// Creates a client for the bucket described by `config`.
    pub fn new(config: S3Config) -> Result<Self, StorageError> {
        let url = Url::parse(&config.endpoint)
            .map_err(|e| StorageError::InvalidEndpoint(format!("{}: {e}", config.endpoint)))?;
        let host = url
            .host_str()
            .ok_or_else(|| StorageError::InvalidEndpoint(config.endpoint.clone()))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            origin: url.origin().ascii_serialization(),
            host,
            base_path: url.path().trim_end_matches('/').to_string(),
            region: config.region,
            creds: Credentials {
                access_key: config.access_key,
                secret_key: config.secret_key,
            },
        })
    }

    /// Sends a signed request and maps non-success responses to
    /// [`StorageError::Api`].
    async fn send(
        &self,
        method: Method,
        key: &str,
        query: &[(&str, &str)],
        body: Vec<u8>,
    ) -> Result<Response, StorageError> {
        let path = format!("{}/{}", self.base_path, sigv4::encode_key(key));
        let query = sigv4::canonical_query(query);
        let payload_hash = sigv4::payload_hash(&body);
        let amz_date = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();

        let headers = [
            ("host", self.host.as_str()),
            ("x-amz-content-sha256", payload_hash.as_str()),
            ("x-amz-date", amz_date.as_str()),
        ];
        let auth = sigv4::authorization(
            &self.creds,
            &self.region,
            SERVICE,
            &SigningRequest {
                method: method.as_str(),
                path: &path,
                query: &query,
                headers: &headers,
                payload_hash: &payload_hash,
                amz_date: &amz_date,
            },
        );

        let url = if query.is_empty() {
            format!("{}{}", self.origin, path)
        } else {
            format!("{}{}?{}", self.origin, path, query)
        };

        trace!(%method, %url, bytes = body.len(), "storage request");

        let resp = self
            .http
            .request(method, &url)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date)
            .header(AUTHORIZATION, auth)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }
        Ok(resp)
    }

    async fn initiate(&self, key: &str) -> Result<String, StorageError> {
        let resp = self
            .send(Method::POST, key, &[("uploads", "")], Vec::new())
            .await?;
        let body = resp.text().await?;
        let upload_id = xml::parse_initiate(&body)?;
        debug!(key, upload_id = %upload_id, "multipart upload initiated");
        Ok(upload_id)
    }

    async fn part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Vec<u8>,
    ) -> Result<String, StorageError> {
        let number = part_number.to_string();
        let resp = self
            .send(
                Method::PUT,
                key,
                &[("partNumber", &number), ("uploadId", upload_id)],
                data,
            )
            .await?;
        resp.headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(StorageError::MissingEtag)
    }

    async fn complete(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StorageError> {
        let body = xml::complete_body(parts)?;
        let resp = self
            .send(
                Method::POST,
                key,
                &[("uploadId", upload_id)],
                body.into_bytes(),
            )
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;
        if xml::is_error_document(&body) {
            return Err(api_error(status, &body));
        }
        debug!(key, upload_id, parts = parts.len(), "multipart upload completed");
        Ok(())
    }

    async fn abort(&self, key: &str, upload_id: &str) -> Result<(), StorageError> {
        self.send(Method::DELETE, key, &[("uploadId", upload_id)], Vec::new())
            .await?;
        debug!(key, upload_id, "multipart upload aborted");
        Ok(())
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_length: u64) -> Result<(), StorageError> {
        let actual = data.len() as u64;
        if actual != content_length {
            return Err(StorageError::LengthMismatch {
                declared: content_length,
                actual,
            });
        }
        self.send(Method::PUT, key, &[], data).await?;
        debug!(key, bytes = content_length, "object stored");
        Ok(())
    }
}

impl ObjectStorage for S3Client {
    fn initiate_multipart<'a>(&'a self, key: &'a str) -> StorageFuture<'a, String> {
        Box::pin(self.initiate(key))
    }

    fn upload_part<'a>(
        &'a self,
        key: &'a str,
        upload_id: &'a str,
        part_number: u32,
        data: Vec<u8>,
    ) -> StorageFuture<'a, String> {
        Box::pin(self.part(key, upload_id, part_number, data))
    }

    fn complete_multipart<'a>(
        &'a self,
        key: &'a str,
        upload_id: &'a str,
        parts: &'a [CompletedPart],
    ) -> StorageFuture<'a, ()> {
        Box::pin(self.complete(key, upload_id, parts))
    }

    fn abort_multipart<'a>(&'a self, key: &'a str, upload_id: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(self.abort(key, upload_id))
    }

    fn put_object<'a>(
        &'a self,
        key: &'a str,
        data: Vec<u8>,
        content_length: u64,
    ) -> StorageFuture<'a, ()> {
        Box::pin(self.put(key, data, content_length))
    }
}

fn api_error(status: u16, body: &str) -> StorageError {
    let doc = xml::parse_error(body);
    StorageError::Api {
        status,
        code: doc.code,
        message: doc.message,
    }
}
