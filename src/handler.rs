//! Inner handler contract and its logging wrapper.

use std::time::Instant;
use tracing::debug;

use crate::observer::{ResponseObserver, ResponseWriter};
use crate::types::RequestSnapshot;
use crate::RequestLogger;

/// An application request handler that writes its response to a [`ResponseWriter`].
pub trait Handler: Send + Sync {
    fn serve(&self, response: &mut dyn ResponseWriter, request: &RequestSnapshot);
}

impl<H: Handler + ?Sized> Handler for std::sync::Arc<H> {
    fn serve(&self, response: &mut dyn ResponseWriter, request: &RequestSnapshot) {
        (**self).serve(response, request);
    }
}

/// Handler built from a closure, see [`handler_fn`].
#[derive(Clone, Copy)]
pub struct HandlerFn<F> {
    f: F,
}

/// Turn a closure into a [`Handler`].
///
/// # Examples
///
/// ```rust
/// use reqlog::{handler_fn, Handler, RequestSnapshot, ResponseRecorder, ResponseWriter};
/// use axum::http::Method;
///
/// let hello = handler_fn(|w, _req| {
///     let _ = w.write_all(b"hello world");
/// });
///
/// let mut recorder = ResponseRecorder::new();
/// hello.serve(&mut recorder, &RequestSnapshot::new(Method::GET, "/"));
/// assert_eq!(recorder.body_str(), "hello world");
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&mut dyn ResponseWriter, &RequestSnapshot) + Send + Sync,
{
    HandlerFn { f }
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(&mut dyn ResponseWriter, &RequestSnapshot) + Send + Sync,
{
    fn serve(&self, response: &mut dyn ResponseWriter, request: &RequestSnapshot) {
        (self.f)(response, request)
    }
}

/// A handler wrapped by [`RequestLogger::handler`].
///
/// Serves the inner handler through a [`ResponseObserver`] and, once it has returned, emits one
/// record describing the exchange.
#[derive(Clone)]
pub struct LoggedHandler<H> {
    inner: H,
    logger: RequestLogger,
}

impl<H> LoggedHandler<H> {
    pub(crate) fn new(inner: H, logger: RequestLogger) -> Self {
        Self { inner, logger }
    }
}

impl<H: Handler> Handler for LoggedHandler<H> {
    fn serve(&self, response: &mut dyn ResponseWriter, request: &RequestSnapshot) {
        let start = Instant::now();
        debug!(method = %request.method, uri = %request.uri, "Serving request");

        let mut observer = ResponseObserver::new(response);
        self.inner.serve(&mut observer, request);

        let duration = start.elapsed();
        self.logger
            .log_exchange(request, observer.status(), observer.size(), duration);
    }
}
