//! Request logger configuration.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::sink::{LogSink, TracingSink};
use crate::types::{FieldValue, Fields};

/// Message used when none is configured.
pub const DEFAULT_MESSAGE: &str = "Request received";

/// Configuration for the request logging middleware.
///
/// Set up once before any request is served; [`RequestLogger`](crate::RequestLogger) keeps it
/// read-only for its whole lifetime.
///
/// # Examples
///
/// ```rust
/// use reqlog::{RequestLoggerConfig, WriterSink};
///
/// // Default configuration: "Request received", tracing sink, nothing ignored
/// let config = RequestLoggerConfig::default();
///
/// // Behind a proxy, with a service tag and a quiet health check
/// let config = RequestLoggerConfig::default()
///     .with_remote_address_headers(["X-Real-IP", "X-Forwarded-For"])
///     .with_custom_field("service", "billing")
///     .with_ignored_path("/healthz")
///     .with_sink(WriterSink::new(std::io::stdout()));
/// ```
#[derive(Clone)]
pub struct RequestLoggerConfig {
    /// Message of every emitted record
    pub message: String,
    /// Extra fields merged into every record, overriding standard fields on collision
    pub custom_fields: Fields,
    /// Headers consulted in order for the client address; the first non-empty one wins
    pub remote_address_headers: Vec<String>,
    /// Request URIs that are never logged. Exact match only
    pub ignored_paths: HashSet<String>,
    /// Destination for emitted records
    pub sink: Arc<dyn LogSink>,
}

impl Default for RequestLoggerConfig {
    fn default() -> Self {
        Self {
            message: DEFAULT_MESSAGE.to_owned(),
            custom_fields: Fields::new(),
            remote_address_headers: Vec::new(),
            ignored_paths: HashSet::new(),
            sink: Arc::new(TracingSink),
        }
    }
}

impl fmt::Debug for RequestLoggerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLoggerConfig")
            .field("message", &self.message)
            .field("custom_fields", &self.custom_fields)
            .field("remote_address_headers", &self.remote_address_headers)
            .field("ignored_paths", &self.ignored_paths)
            .finish_non_exhaustive()
    }
}

impl RequestLoggerConfig {
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_custom_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.custom_fields.insert(key.into(), value.into());
        self
    }

    /// Replace the list of headers consulted for the remote address.
    pub fn with_remote_address_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remote_address_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ignored_path(mut self, path: impl Into<String>) -> Self {
        self.ignored_paths.insert(path.into());
        self
    }

    pub fn with_sink(mut self, sink: impl LogSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Use an already shared sink, e.g. one that tests keep a handle to.
    pub fn with_shared_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }
}
