//! In-memory response channel.

use axum::http::{HeaderMap, StatusCode};
use std::io;

use crate::observer::{Flusher, ResponseWriter};

/// A [`ResponseWriter`] that records everything written to it.
///
/// Useful for exercising handlers without a server. It supports flushing (unless built with
/// [`without_flush`](Self::without_flush)) and never supports connection takeover.
///
/// # Examples
///
/// ```rust
/// use reqlog::{ResponseRecorder, ResponseWriter};
///
/// let mut recorder = ResponseRecorder::new();
/// recorder.write_all(b"hello world").unwrap();
/// assert_eq!(recorder.status(), 200);
/// assert_eq!(recorder.body_str(), "hello world");
/// ```
#[derive(Debug, Clone)]
pub struct ResponseRecorder {
    headers: HeaderMap,
    status: StatusCode,
    body: Vec<u8>,
    flushes: usize,
    supports_flush: bool,
    write_limit: Option<usize>,
    fail_with: Option<io::ErrorKind>,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self {
            headers: HeaderMap::new(),
            status: StatusCode::OK,
            body: Vec::new(),
            flushes: 0,
            supports_flush: true,
            write_limit: None,
            fail_with: None,
        }
    }

    /// Accept at most `limit` bytes per write call.
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Fail every write with an error of the given kind.
    pub fn failing_with(mut self, kind: io::ErrorKind) -> Self {
        self.fail_with = Some(kind);
        self
    }

    /// Hide the flush capability.
    pub fn without_flush(mut self) -> Self {
        self.supports_flush = false;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, with invalid UTF-8 replaced.
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl Default for ResponseRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(kind) = self.fail_with {
            return Err(io::Error::new(kind, "recorder configured to fail writes"));
        }
        let n = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        self.body.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        if self.supports_flush {
            Some(self)
        } else {
            None
        }
    }
}

impl Flusher for ResponseRecorder {
    fn flush(&mut self) {
        self.flushes += 1;
    }
}
