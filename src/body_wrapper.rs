//! Response body observation for the tower middleware.
//!
//! On the tower path the response channel is the returned body. [`ObservedBody`] passes every
//! frame through untouched while counting data bytes, and emits the request's log record once the
//! body has been fully produced.

use axum::http::StatusCode;
use bytes::Buf;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Instant;

use crate::types::RequestSnapshot;
use crate::RequestLogger;

/// Everything needed to log an exchange once its body is done.
pub(crate) struct PendingRecord {
    pub(crate) logger: RequestLogger,
    pub(crate) request: RequestSnapshot,
    pub(crate) status: StatusCode,
    pub(crate) start: Instant,
}

impl PendingRecord {
    pub(crate) fn emit(self, size: u64) {
        self.logger
            .log_exchange(&self.request, self.status, size, self.start.elapsed());
    }
}

pin_project! {
    /// Response body wrapper that counts the bytes it yields.
    ///
    /// The record is emitted when the inner body reaches end of stream or fails. A body dropped
    /// before that (the client went away, the connection was cancelled) emits nothing.
    pub struct ObservedBody<B> {
        #[pin]
        inner: B,
        size: u64,
        pending: Option<PendingRecord>,
    }
}

impl<B: Body> ObservedBody<B> {
    pub(crate) fn new(inner: B, pending: PendingRecord) -> Self {
        let mut body = Self {
            inner,
            size: 0,
            pending: Some(pending),
        };
        // Empty bodies may never be polled at all
        if body.inner.is_end_stream() {
            if let Some(pending) = body.pending.take() {
                pending.emit(0);
            }
        }
        body
    }

    /// Wrap a body whose exchange has already been logged.
    pub(crate) fn completed(inner: B) -> Self {
        Self {
            inner,
            size: 0,
            pending: None,
        }
    }

    /// Data bytes yielded so far.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl<B: Body> Body for ObservedBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        let polled = ready!(this.inner.as_mut().poll_frame(cx));

        let finished = match &polled {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    *this.size += data.remaining() as u64;
                }
                this.inner.is_end_stream()
            }
            Some(Err(_)) | None => true,
        };

        if finished {
            if let Some(pending) = this.pending.take() {
                pending.emit(*this.size);
            }
        }
        Poll::Ready(polled)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
