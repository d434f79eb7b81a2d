//! Data types for observed requests and emitted log records.
//!
//! [`RequestSnapshot`] is the read-only view of an inbound request the interceptor logs from,
//! [`LogRecord`] is what gets handed to a [`LogSink`](crate::LogSink) once per logged request.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Field key for the resolved remote address.
pub const HTTP_ADDR: &str = "http_addr";
/// Field key for the request method.
pub const HTTP_METHOD: &str = "http_method";
/// Field key for the raw request URI.
pub const HTTP_URI: &str = "http_uri";
/// Field key for the protocol version.
pub const HTTP_PROTO: &str = "http_proto";
/// Field key for the captured status code.
pub const HTTP_STATUS: &str = "http_status";
/// Field key for the number of response bytes written.
pub const HTTP_SIZE: &str = "http_size";
/// Field key for the processing duration.
pub const HTTP_DURATION: &str = "http_duration";

/// Field mapping of a log record. Ordered by key so rendered output is stable.
pub type Fields = BTreeMap<String, FieldValue>;

/// A single structured field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Uint(u64),
    Bool(bool),
    Duration(Duration),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Uint(v) => write!(f, "{v}"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            // Debug renders as `4.511µs`, `12ms`, ...
            FieldValue::Duration(d) => write!(f, "{d:?}"),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Str(s) => serializer.serialize_str(s),
            FieldValue::Int(v) => serializer.serialize_i64(*v),
            FieldValue::Uint(v) => serializer.serialize_u64(*v),
            FieldValue::Bool(v) => serializer.serialize_bool(*v),
            FieldValue::Duration(_) => serializer.collect_str(self),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Uint(value)
    }
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        FieldValue::Uint(value.into())
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        FieldValue::Uint(value as u64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Duration> for FieldValue {
    fn from(value: Duration) -> Self {
        FieldValue::Duration(value)
    }
}

/// Read-only view of an inbound request, taken at observation time.
///
/// # Examples
///
/// ```rust
/// use axum::http::{HeaderName, HeaderValue, Method};
/// use reqlog::RequestSnapshot;
///
/// let request = RequestSnapshot::new(Method::GET, "/info")
///     .with_remote_addr("127.0.0.1:41634")
///     .with_header(
///         HeaderName::from_static("x-real-ip"),
///         HeaderValue::from_static("98.76.54.32"),
///     );
/// assert_eq!(request.proto, "HTTP/1.1");
/// ```
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request URI exactly as received, including query and fragment if present
    pub uri: String,
    /// Protocol version string, e.g. `HTTP/1.1`
    pub proto: String,
    /// Connection-level remote address
    pub remote_addr: String,
    /// Request headers; lookups are case-insensitive
    pub headers: HeaderMap,
}

impl RequestSnapshot {
    /// Snapshot of an HTTP/1.1 request with no headers and an empty remote address.
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            proto: "HTTP/1.1".to_owned(),
            remote_addr: String::new(),
            headers: HeaderMap::new(),
        }
    }

    /// Snapshot of an `http::Request`. The remote address is left empty; the tower layer
    /// fills it in from `ConnectInfo` when the server provides one.
    ///
    /// The URI is the path and query as sent by the client, also for HTTP/2 requests whose
    /// `Uri` carries scheme and authority. Authority-form targets (`CONNECT`) are kept whole.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let uri = request.uri();
        Self {
            method: request.method().clone(),
            uri: uri
                .path_and_query()
                .map_or_else(|| uri.to_string(), |target| target.as_str().to_owned()),
            proto: format!("{:?}", request.version()),
            remote_addr: String::new(),
            headers: request.headers().clone(),
        }
    }

    pub fn with_proto(mut self, proto: impl Into<String>) -> Self {
        self.proto = proto.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = addr.into();
        self
    }

    /// Appends a header value, keeping any existing values for the same name.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

/// One structured log entry: a message plus its field mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub message: String,
    pub fields: Fields,
}

impl LogRecord {
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
}
