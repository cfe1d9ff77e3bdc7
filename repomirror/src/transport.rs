//! HTTP transport for repository files.
//!
//! The engine only needs one operation: GET a URL and hand back the status,
//! declared length and a body reader. [`Transport`] is that seam; production
//! runs use [`HttpTransport`], tests substitute an in-memory implementation.

use std::fmt;
use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Url;
use tracing::debug;

use crate::config::DEFAULT_TIMEOUT;
use crate::error::{MirrorError, MirrorResult};

/// Response to a GET request.
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Declared `Content-Length`, if the server sent one.
    pub content_length: Option<u64>,
    /// Response body.
    pub body: Box<dyn Read + Send>,
}

impl TransportResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Read the full body into memory.
    pub fn into_bytes(mut self, url: &Url) -> MirrorResult<Vec<u8>> {
        let mut data = Vec::with_capacity(self.content_length.unwrap_or(0).min(64 << 20) as usize);
        self.body
            .read_to_end(&mut data)
            .map_err(|e| MirrorError::Transport {
                url: url.to_string(),
                reason: format!("read error: {}", e),
            })?;
        Ok(data)
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Something that can GET repository files.
///
/// Implementations must be shareable across transfer worker threads.
pub trait Transport: Send + Sync {
    /// Issue a GET request.
    ///
    /// A non-2xx status is not an error at this layer; callers decide what a
    /// failed status means for them. Errors are reserved for requests that
    /// produced no response at all.
    fn get(&self, url: &Url) -> MirrorResult<TransportResponse>;
}

/// Blocking HTTP(S) transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport with the default timeout.
    pub fn new() -> MirrorResult<Self> {
        Self::with_settings(DEFAULT_TIMEOUT, concat!("repomirror/", env!("CARGO_PKG_VERSION")))
    }

    /// Create a transport with a custom timeout and user agent.
    pub fn with_settings(timeout: Duration, user_agent: &str) -> MirrorResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| {
                MirrorError::InvalidConfig(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, timeout })
    }

    /// Configured request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &Url) -> MirrorResult<TransportResponse> {
        debug!(%url, "GET");

        let response = self.client.get(url.clone()).send().map_err(|e| {
            let reason = if e.is_timeout() {
                format!("timed out after {}s", self.timeout.as_secs())
            } else {
                e.to_string()
            };
            MirrorError::Transport {
                url: url.to_string(),
                reason,
            }
        })?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        debug!(%url, status, ?content_length, "response");

        Ok(TransportResponse {
            status,
            content_length,
            body: Box::new(response),
        })
    }
}
