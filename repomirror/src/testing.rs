//! In-memory transport for unit tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Url;

use crate::error::{MirrorError, MirrorResult};
use crate::transport::{Transport, TransportResponse};

pub(crate) const BASE_URL: &str = "http://mirror.example.com/os/";

#[derive(Clone)]
enum Reply {
    Body {
        status: u16,
        body: Vec<u8>,
        content_length: Option<u64>,
    },
    ConnectionError,
}

/// Serves canned responses keyed by path relative to [`BASE_URL`].
#[derive(Default)]
pub(crate) struct MockTransport {
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub(crate) fn base_url() -> Url {
        Url::parse(BASE_URL).unwrap()
    }

    pub(crate) fn serve(&self, path: &str, body: &[u8]) {
        self.serve_with_length(path, body, Some(body.len() as u64));
    }

    pub(crate) fn serve_with_length(&self, path: &str, body: &[u8], content_length: Option<u64>) {
        self.replies.lock().insert(
            path.to_string(),
            Reply::Body {
                status: 200,
                body: body.to_vec(),
                content_length,
            },
        );
    }

    pub(crate) fn serve_status(&self, path: &str, status: u16) {
        self.replies.lock().insert(
            path.to_string(),
            Reply::Body {
                status,
                body: Vec::new(),
                content_length: Some(0),
            },
        );
    }

    pub(crate) fn refuse(&self, path: &str) {
        self.replies
            .lock()
            .insert(path.to_string(), Reply::ConnectionError);
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn get(&self, url: &Url) -> MirrorResult<TransportResponse> {
        let path = url
            .as_str()
            .strip_prefix(BASE_URL)
            .unwrap_or(url.as_str())
            .to_string();
        self.requests.lock().push(path.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let reply = self.replies.lock().get(&path).cloned();
        match reply {
            Some(Reply::Body {
                status,
                body,
                content_length,
            }) => Ok(TransportResponse {
                status,
                content_length,
                body: Box::new(Cursor::new(body)),
            }),
            Some(Reply::ConnectionError) => Err(MirrorError::Transport {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
            None => Ok(TransportResponse {
                status: 404,
                content_length: Some(0),
                body: Box::new(Cursor::new(Vec::new())),
            }),
        }
    }
}
