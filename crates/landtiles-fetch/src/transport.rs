//! Byte transport for feeds and tiles.

use crate::FetchError;
use std::fs::File;
use std::io::Read;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// An open response body.
pub struct ResponseBody {
    /// Streaming body.
    pub reader: Box<dyn Read + Send>,
    /// Length announced by the server, if any.
    pub content_length: Option<u64>,
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Fetches URLs. Implementations must be shareable across worker threads.
pub trait Transport: Send + Sync {
    /// Open `url` for streaming.
    fn open(&self, url: &str) -> Result<ResponseBody, FetchError>;

    /// Fetch the whole body of `url`.
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut body = self.open(url)?;
        let mut buf = Vec::with_capacity(body.content_length.unwrap_or(0) as usize);
        body.reader
            .read_to_end(&mut buf)
            .map_err(|e| FetchError::Interrupted {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(buf)
    }
}

/// Blocking HTTP(S) transport; `file://` URLs are read from disk so that
/// sources may point at a local mirror.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Transport with the default timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Transport with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("landtiles/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
                transient: false,
            })?;
        Ok(Self { client })
    }

    fn open_file(url: &str, parsed: &Url) -> Result<ResponseBody, FetchError> {
        let path = parsed.to_file_path().map_err(|()| FetchError::Malformed {
            url: url.to_string(),
            reason: "not a local file path".to_string(),
        })?;
        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::Status {
                url: url.to_string(),
                status: 404,
            },
            _ => FetchError::Request {
                url: url.to_string(),
                reason: e.to_string(),
                transient: false,
            },
        })?;
        let content_length = file.metadata().ok().map(|m| m.len());
        Ok(ResponseBody {
            reader: Box::new(file),
            content_length,
        })
    }
}

impl Transport for HttpTransport {
    fn open(&self, url: &str) -> Result<ResponseBody, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::Malformed {
            url: url.to_string(),
            reason: format!("invalid URL: {e}"),
        })?;
        match parsed.scheme() {
            "file" => Self::open_file(url, &parsed),
            "http" | "https" => {
                debug!(url, "GET");
                let response = self.client.get(parsed).send().map_err(|e| FetchError::Request {
                    url: url.to_string(),
                    reason: e.to_string(),
                    transient: e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
                })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                let content_length = response.content_length();
                Ok(ResponseBody {
                    reader: Box::new(response),
                    content_length,
                })
            }
            other => Err(FetchError::Malformed {
                url: url.to_string(),
                reason: format!("unsupported URL scheme '{other}'"),
            }),
        }
    }
}
