//! Transparent response observation.
//!
//! [`ResponseWriter`] is the write-capable contract a response channel implements. Streaming
//! flush and raw connection takeover are separate capabilities ([`Flusher`],
//! [`ConnectionHijacker`]) that a channel may or may not expose; callers probe for them at
//! runtime through [`ResponseWriter::as_flusher`] and [`ResponseWriter::as_hijacker`].
//!
//! [`ResponseObserver`] wraps a channel, forwards every call unchanged, and records the status
//! code and number of bytes written along the way.

use axum::http::{HeaderMap, StatusCode};
use std::io::{self, Read, Write};

/// Error type for response observation
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("response writer does not support connection takeover")]
    HijackUnsupported,
    #[error("connection takeover failed: {0}")]
    Io(#[from] io::Error),
}

/// A raw bidirectional connection handed out by a connection takeover.
pub trait RawConnection: Read + Write + Send {}

impl<T: Read + Write + Send> RawConnection for T {}

/// Optional capability: push buffered response data to the client.
pub trait Flusher {
    fn flush(&mut self);
}

/// Optional capability: take over the underlying connection, e.g. for a protocol upgrade.
///
/// After a successful takeover the response channel must not be used again.
pub trait ConnectionHijacker {
    fn hijack(&mut self) -> Result<Box<dyn RawConnection>, ObserverError>;
}

/// The outbound response channel.
///
/// Only `headers_mut`, `set_status` and `write` are required. Channels that can flush or hand
/// out their connection override the matching `as_*` probe to return themselves.
pub trait ResponseWriter {
    /// Response headers, to be modified before the first write.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Set the response status code.
    fn set_status(&mut self, status: StatusCode);

    /// Write part of the response body, returning how many bytes were accepted.
    ///
    /// Like [`std::io::Write::write`], this may accept fewer bytes than offered.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Write the whole buffer, retrying on short writes.
    fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole response buffer",
                    ));
                }
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Flush capability of this channel, if it has one.
    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        None
    }

    /// Connection takeover capability of this channel, if it has one.
    fn as_hijacker(&mut self) -> Option<&mut dyn ConnectionHijacker> {
        None
    }
}

/// Pass-through wrapper around a [`ResponseWriter`] that captures status and body size.
///
/// The status starts out as `200 OK`, the implicit status of a response whose handler never
/// sets one, and is overwritten by every [`set_status`](ResponseWriter::set_status) call.
/// The size is the sum of byte counts reported by the wrapped channel, so short writes and
/// partially failed writes are counted as the channel reports them.
///
/// # Examples
///
/// ```rust
/// use axum::http::StatusCode;
/// use reqlog::{ResponseObserver, ResponseRecorder, ResponseWriter};
///
/// let mut recorder = ResponseRecorder::new();
/// let mut observer = ResponseObserver::new(&mut recorder);
/// observer.set_status(StatusCode::CREATED);
/// observer.write_all(b"bar").unwrap();
///
/// assert_eq!(observer.status(), StatusCode::CREATED);
/// assert_eq!(observer.size(), 3);
/// ```
pub struct ResponseObserver<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: StatusCode,
    size: u64,
}

impl<'a> ResponseObserver<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self {
            inner,
            status: StatusCode::OK,
            size: 0,
        }
    }

    /// The most recently set status, or `200 OK` if none was set.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Total number of body bytes the wrapped channel accepted.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Flush the wrapped channel if it can flush; otherwise do nothing.
    pub fn flush(&mut self) {
        Flusher::flush(self);
    }

    /// Take over the wrapped channel's connection if it supports that.
    pub fn take_over_connection(&mut self) -> Result<Box<dyn RawConnection>, ObserverError> {
        ConnectionHijacker::hijack(self)
    }
}

impl ResponseWriter for ResponseObserver<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
        self.inner.set_status(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf);
        if let Ok(n) = &result {
            self.size += *n as u64;
        }
        result
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }

    fn as_hijacker(&mut self) -> Option<&mut dyn ConnectionHijacker> {
        Some(self)
    }
}

impl Flusher for ResponseObserver<'_> {
    fn flush(&mut self) {
        if let Some(flusher) = self.inner.as_flusher() {
            flusher.flush();
        }
    }
}

impl ConnectionHijacker for ResponseObserver<'_> {
    fn hijack(&mut self) -> Result<Box<dyn RawConnection>, ObserverError> {
        match self.inner.as_hijacker() {
            Some(hijacker) => hijacker.hijack(),
            None => Err(ObserverError::HijackUnsupported),
        }
    }
}
