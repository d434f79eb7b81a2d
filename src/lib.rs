//! # reqlog
//!
//! Request logging middleware for HTTP servers. Every request that passes through it produces
//! exactly one structured record with the status, method, URI, protocol, remote address, response
//! size and processing duration of the exchange.
//!
//! ## Features
//!
//! - **Transparent**: responses reach the client exactly as the wrapped handler produced them
//! - **Capability preserving**: flush and connection takeover keep working through the wrapper
//! - **Proxy aware**: the client address can be taken from headers like `X-Real-IP`
//! - **Pluggable output**: records go to any [`LogSink`], `tracing` by default
//!
//! ## Quick Start
//!
//! With axum, mount the logger as a tower layer:
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use reqlog::{RequestLogger, RequestLoggerConfig};
//!
//! async fn info() -> &'static str {
//!     "hello world"
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     tracing_subscriber::fmt::init();
//!
//!     let logger = RequestLogger::new(
//!         RequestLoggerConfig::default().with_remote_address_headers(["X-Real-IP"]),
//!     );
//!     let app = Router::new().route("/info", get(info)).layer(logger.layer());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! A GET request to `/info` then logs something like:
//!
//! ```text
//! INFO reqlog: Request received fields=http_addr="127.0.0.1:41634" http_duration="4.511µs" http_method=GET http_proto=HTTP/1.1 http_size=11 http_status=200 http_uri=/info
//! ```
//!
//! [`TracingSink`] packs the fields into one `fields` value. For one key per field, as JSON
//! log pipelines expect, configure a [`JsonSink`] instead.
//!
//! ## Write-style handlers
//!
//! Handlers that write to a response channel (see [`ResponseWriter`]) are wrapped with
//! [`RequestLogger::handler`]:
//!
//! ```rust
//! use axum::http::{Method, StatusCode};
//! use reqlog::{handler_fn, Handler, RequestLogger, RequestLoggerConfig, RequestSnapshot};
//! use reqlog::{MemorySink, ResponseRecorder, ResponseWriter};
//! use std::sync::Arc;
//!
//! let sink = Arc::new(MemorySink::new());
//! let logger = RequestLogger::new(RequestLoggerConfig::default().with_shared_sink(sink.clone()));
//!
//! let app = logger.handler(handler_fn(|w, _req| {
//!     w.set_status(StatusCode::BAD_GATEWAY);
//!     let _ = w.write_all(b"Bad Gateway");
//! }));
//!
//! let mut response = ResponseRecorder::new();
//! app.serve(&mut response, &RequestSnapshot::new(Method::POST, "/foo"));
//!
//! assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
//! assert_eq!(sink.records()[0].field("http_status"), Some(&502u16.into()));
//! ```

use axum::{
    extract::ConnectInfo,
    http::{Method, Request, Response, StatusCode},
};
use http_body::Body;
use std::{
    borrow::Cow,
    future::Future,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, Instant},
};
use tower::{Layer, Service};
use tracing::{debug, instrument};

pub mod types;
pub use types::{FieldValue, Fields, LogRecord, RequestSnapshot};
use types::{HTTP_ADDR, HTTP_DURATION, HTTP_METHOD, HTTP_PROTO, HTTP_SIZE, HTTP_STATUS, HTTP_URI};

pub mod config;
pub use config::{RequestLoggerConfig, DEFAULT_MESSAGE};

pub mod observer;
pub use observer::{
    ConnectionHijacker, Flusher, ObserverError, RawConnection, ResponseObserver, ResponseWriter,
};

pub mod recorder;
pub use recorder::ResponseRecorder;

pub mod handler;
pub use handler::{handler_fn, Handler, HandlerFn, LoggedHandler};

pub mod sink;
pub use sink::{JsonSink, LogSink, MemorySink, TracingSink, WriterSink};

pub mod multi_sink;
pub use multi_sink::MultiSink;

pub mod body_wrapper;
use body_wrapper::PendingRecord;
pub use body_wrapper::ObservedBody;

/// The request logging interceptor.
///
/// Built once from a [`RequestLoggerConfig`] and cheap to clone; clones share the same
/// configuration. Use [`handler`](Self::handler) to wrap a write-style [`Handler`] or
/// [`layer`](Self::layer) to get a tower layer.
#[derive(Clone, Debug, Default)]
pub struct RequestLogger {
    config: Arc<RequestLoggerConfig>,
}

impl RequestLogger {
    /// Create a logger. An empty message is replaced by [`DEFAULT_MESSAGE`].
    pub fn new(mut config: RequestLoggerConfig) -> Self {
        if config.message.is_empty() {
            config.message = DEFAULT_MESSAGE.to_owned();
        }
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RequestLoggerConfig {
        &self.config
    }

    /// Wrap a handler so that every request it serves is logged.
    pub fn handler<H: Handler>(&self, next: H) -> LoggedHandler<H> {
        LoggedHandler::new(next, self.clone())
    }

    /// Tower layer logging every request that passes through it.
    pub fn layer(&self) -> RequestLoggerLayer {
        RequestLoggerLayer {
            logger: self.clone(),
        }
    }

    /// Whether requests with this exact raw URI are excluded from logging.
    pub fn is_ignored(&self, uri: &str) -> bool {
        self.config.ignored_paths.contains(uri)
    }

    /// The address to log for a request: the value of the first configured header that is
    /// present and non-empty, otherwise the connection-level address.
    ///
    /// Header bytes that are not valid UTF-8 are kept, lossily decoded.
    pub fn resolve_remote_addr<'r>(&self, request: &'r RequestSnapshot) -> Cow<'r, str> {
        self.config
            .remote_address_headers
            .iter()
            .filter_map(|name| request.headers.get(name.as_str()))
            .find(|value| !value.is_empty())
            .map_or(Cow::Borrowed(request.remote_addr.as_str()), |value| {
                String::from_utf8_lossy(value.as_bytes())
            })
    }

    /// Build the record for a finished exchange, or `None` if the request is ignored.
    ///
    /// Custom fields are applied last and win over standard fields with the same key.
    pub fn record_for(
        &self,
        request: &RequestSnapshot,
        status: StatusCode,
        size: u64,
        duration: Duration,
    ) -> Option<LogRecord> {
        if self.is_ignored(&request.uri) {
            return None;
        }

        let mut fields = Fields::new();
        fields.insert(HTTP_ADDR.into(), self.resolve_remote_addr(request).into_owned().into());
        fields.insert(HTTP_METHOD.into(), request.method.as_str().into());
        fields.insert(HTTP_URI.into(), request.uri.as_str().into());
        fields.insert(HTTP_PROTO.into(), request.proto.as_str().into());
        fields.insert(HTTP_STATUS.into(), status.as_u16().into());
        fields.insert(HTTP_SIZE.into(), size.into());
        fields.insert(HTTP_DURATION.into(), duration.into());
        fields.extend(
            self.config
                .custom_fields
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );

        Some(LogRecord {
            message: self.config.message.clone(),
            fields,
        })
    }

    /// Emit the record for a finished exchange to the configured sink.
    pub(crate) fn log_exchange(
        &self,
        request: &RequestSnapshot,
        status: StatusCode,
        size: u64,
        duration: Duration,
    ) {
        match self.record_for(request, status, size, duration) {
            Some(record) => self.config.sink.emit(&record.message, &record.fields),
            None => debug!(uri = %request.uri, "Request ignored"),
        }
    }
}

/// HEAD responses and 1xx, 204 and 304 statuses never put bytes on the wire.
fn carries_no_body(method: &Method, status: StatusCode) -> bool {
    method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Tower layer for the request logging middleware.
///
/// Created by [`RequestLogger::layer`]. The status comes from the inner service's response, the
/// size is counted while the response body streams out, and the record is emitted once the body
/// is complete. The remote address is read from axum's `ConnectInfo<SocketAddr>` when the server
/// was started with `into_make_service_with_connect_info`.
///
/// # Examples
///
/// ```rust,no_run
/// use axum::{routing::get, Router};
/// use reqlog::RequestLogger;
/// use std::net::SocketAddr;
///
/// # async fn hello() -> &'static str { "Hello" }
/// # #[tokio::main]
/// # async fn main() {
/// let app = Router::new()
///     .route("/hello", get(hello))
///     .layer(RequestLogger::default().layer());
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
/// axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
///     .await
///     .unwrap();
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct RequestLoggerLayer {
    logger: RequestLogger,
}

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggerService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

/// Tower service implementation for the request logging middleware.
///
/// Users typically don't interact with this type directly - it's created by
/// [`RequestLoggerLayer`].
#[derive(Clone, Debug)]
pub struct RequestLoggerService<S> {
    inner: S,
    logger: RequestLogger,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLoggerService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Send + 'static,
    S::Future: Send + 'static,
    ResBody: Body + 'static,
{
    type Response = Response<ObservedBody<ResBody>>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    #[instrument(skip_all)]
    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let start = Instant::now();

        let mut snapshot = RequestSnapshot::from_request(&request);
        if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
            snapshot.remote_addr = addr.to_string();
        }
        debug!(method = %snapshot.method, uri = %snapshot.uri, "Starting request processing");

        let logger = self.logger.clone();
        let future = self.inner.call(request);

        Box::pin(async move {
            // Inner service errors pass through unlogged
            let response = match future.await {
                Ok(response) => response,
                Err(e) => return Err(e),
            };
            let status = response.status();
            debug!(status = %status, "Inner service response received");

            let pending = PendingRecord {
                logger,
                request: snapshot,
                status,
                start,
            };
            // The server discards these bodies unpolled
            if carries_no_body(&pending.request.method, status) {
                pending.emit(0);
                return Ok(response.map(ObservedBody::completed));
            }

            Ok(response.map(|body| ObservedBody::new(body, pending)))
        })
    }
}
