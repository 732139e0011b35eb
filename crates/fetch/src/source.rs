use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{FetchError, PayloadStream, RemoteFetch};

/// File name used when a link has no usable last path segment.
pub const FALLBACK_FILE_NAME: &str = "downloaded_file";

/// Where a payload comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// `http://` or `https://` link.
    Remote(String),
    /// Path on the local filesystem, given bare or as a `file://` link.
    Local(PathBuf),
}

impl Source {
    /// Classifies a source identifier.
    pub fn parse(id: &str) -> Result<Self, FetchError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(FetchError::InvalidSource(id.to_string()));
        }

        match id.split_once("://") {
            Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
                "http" | "https" => Ok(Self::Remote(id.to_string())),
                "file" if !rest.is_empty() => Ok(Self::Local(PathBuf::from(rest))),
                _ => Err(FetchError::InvalidSource(id.to_string())),
            },
            None => Ok(Self::Local(PathBuf::from(id))),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Returns the payload size: `Content-Length` of a HEAD request for
    /// remote links, file metadata for local paths.
    pub async fn size(&self, fetcher: &dyn RemoteFetch) -> Result<u64, FetchError> {
        match self {
            Self::Remote(url) => fetcher.head(url).await,
            Self::Local(path) => {
                let meta = tokio::fs::metadata(path).await?;
                if !meta.is_file() {
                    return Err(FetchError::InvalidSource(path.display().to_string()));
                }
                debug!(path = %path.display(), size = meta.len(), "local size discovered");
                Ok(meta.len())
            }
        }
    }

    /// Opens the payload as a byte stream.
    pub async fn open(&self, fetcher: &dyn RemoteFetch) -> Result<PayloadStream, FetchError> {
        match self {
            Self::Remote(url) => fetcher.get(url).await,
            Self::Local(path) => Ok(Box::pin(tokio::fs::File::open(path).await?)),
        }
    }

    /// Returns the local path for local sources.
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::Local(path) => Some(path),
            Self::Remote(_) => None,
        }
    }

    /// Last path segment, used as the file name when saving the payload.
    ///
    /// Query strings and fragments are ignored. Falls back to
    /// [`FALLBACK_FILE_NAME`] when nothing usable is left.
    pub fn file_name(&self) -> String {
        let segment = match self {
            Self::Remote(url) => {
                let path = url.split(['?', '#']).next().unwrap_or_default();
                let path = path.split_once("://").map_or(path, |(_, rest)| rest);
                // The first segment is the authority, never a file name.
                match path.split_once('/') {
                    Some((_, p)) => p.rsplit('/').next().unwrap_or_default().to_string(),
                    None => String::new(),
                }
            }
            Self::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        match segment.as_str() {
            "" | "." | ".." => FALLBACK_FILE_NAME.to_string(),
            _ => segment,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => f.write_str(url),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    struct NoNetwork;

    impl RemoteFetch for NoNetwork {
        fn head<'a>(&'a self, _url: &'a str) -> crate::FetchFuture<'a, u64> {
            Box::pin(async { Err(FetchError::Status(599)) })
        }

        fn get<'a>(&'a self, _url: &'a str) -> crate::FetchFuture<'a, PayloadStream> {
            Box::pin(async { Err(FetchError::Status(599)) })
        }
    }

    #[test]
    fn parse_classifies_sources() {
        assert_eq!(
            Source::parse("https://example.com/a.bin").unwrap(),
            Source::Remote("https://example.com/a.bin".into())
        );
        assert_eq!(
            Source::parse("  HTTP://example.com/a.bin \n").unwrap(),
            Source::Remote("HTTP://example.com/a.bin".into())
        );
        assert_eq!(
            Source::parse("file:///data/a.bin").unwrap(),
            Source::Local(PathBuf::from("/data/a.bin"))
        );
        assert_eq!(
            Source::parse("data/a.bin").unwrap(),
            Source::Local(PathBuf::from("data/a.bin"))
        );
    }

    #[test]
    fn parse_rejects_unusable_sources() {
        assert!(matches!(Source::parse("   "), Err(FetchError::InvalidSource(_))));
        assert!(matches!(
            Source::parse("ftp://example.com/a.bin"),
            Err(FetchError::InvalidSource(_))
        ));
        assert!(matches!(Source::parse("file://"), Err(FetchError::InvalidSource(_))));
    }

    #[test]
    fn file_name_takes_last_segment() {
        let src = Source::parse("https://hf.co/org/model/resolve/main/model.bin?download=true").unwrap();
        assert_eq!(src.file_name(), "model.bin");

        let src = Source::parse("/tmp/dir/archive.tar").unwrap();
        assert_eq!(src.file_name(), "archive.tar");
    }

    #[test]
    fn file_name_falls_back() {
        for link in ["https://example.com", "https://example.com/", "https://example.com/dir/"] {
            let src = Source::parse(link).unwrap();
            assert_eq!(src.file_name(), FALLBACK_FILE_NAME, "{link}");
        }
    }

    #[tokio::test]
    async fn local_size_and_open() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("payload.bin");
        std::fs::write(&path, b"local payload").unwrap();

        let src = Source::Local(path);
        assert_eq!(src.size(&NoNetwork).await.unwrap(), 13);

        let mut stream = src.open(&NoNetwork).await.unwrap();
        let mut data = Vec::new();
        stream.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"local payload");
    }

    #[tokio::test]
    async fn local_directory_is_not_a_payload() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = Source::Local(dir.path().to_path_buf());
        assert!(matches!(
            src.size(&NoNetwork).await,
            Err(FetchError::InvalidSource(_))
        ));
    }

    #[tokio::test]
    async fn missing_local_file_is_io_error() {
        let src = Source::Local(PathBuf::from("/nonexistent/link2cos/payload.bin"));
        assert!(matches!(src.size(&NoNetwork).await, Err(FetchError::Io(_))));
        assert!(matches!(src.open(&NoNetwork).await, Err(FetchError::Io(_))));
    }

    #[tokio::test]
    async fn remote_goes_through_fetcher() {
        let src = Source::Remote("https://example.com/a.bin".into());
        assert!(matches!(src.size(&NoNetwork).await, Err(FetchError::Status(599))));
    }
}
