//! Destinations for emitted request log records.
//!
//! A [`LogSink`] receives a message plus its field mapping once per logged request. Formatting,
//! buffering and the final destination are entirely the sink's business. Sinks are shared by
//! every in-flight request, so implementations must be safe for concurrent use.

use serde::Serialize;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

use crate::types::{Fields, LogRecord};

/// Trait for structured log destinations.
///
/// # Examples
///
/// ```rust
/// use reqlog::{Fields, LogSink};
///
/// #[derive(Debug)]
/// struct StdoutSink;
///
/// impl LogSink for StdoutSink {
///     fn emit(&self, message: &str, fields: &Fields) {
///         println!("{message} {}", reqlog::sink::render_fields(fields));
///     }
/// }
/// ```
pub trait LogSink: Send + Sync + 'static {
    /// Emit one record. Called exactly once per logged request.
    fn emit(&self, message: &str, fields: &Fields);
}

impl<S: LogSink + ?Sized> LogSink for std::sync::Arc<S> {
    fn emit(&self, message: &str, fields: &Fields) {
        (**self).emit(message, fields);
    }
}

/// Render fields as space separated `key=value` pairs, quoting values that need it.
pub fn render_fields(fields: &Fields) -> String {
    let mut out = String::new();
    for (key, value) in fields {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(key);
        out.push('=');
        out.push_str(&quote_if_needed(&value.to_string()));
    }
    out
}

fn quote_if_needed(value: &str) -> String {
    let bare = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '/' | '@' | '^' | '+'));
    if bare {
        value.to_owned()
    } else {
        format!("{value:?}")
    }
}

/// Default sink: one `tracing` INFO event per record on the `reqlog` target.
///
/// All fields travel in a single rendered `fields` value. Use [`JsonSink`] when consumers need
/// each field as its own key.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, message: &str, fields: &Fields) {
        info!(target: "reqlog", fields = %render_fields(fields), "{message}");
    }
}

/// Sink that writes one text line per record to any [`Write`] destination.
///
/// Lines look like `level=info msg="Request received" http_method=GET http_status=200 ...`
/// with fields ordered by key. Write failures are reported through `tracing` and otherwise
/// dropped.
///
/// # Examples
///
/// ```rust
/// use reqlog::{Fields, LogSink, WriterSink};
///
/// let sink = WriterSink::new(Vec::new());
/// let mut fields = Fields::new();
/// fields.insert("http_status".into(), 200u16.into());
/// sink.emit("Request received", &fields);
///
/// let output = String::from_utf8(sink.into_inner()).unwrap();
/// assert_eq!(output, "level=info msg=\"Request received\" http_status=200\n");
/// ```
#[derive(Debug, Default)]
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send + 'static> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Run `f` against the underlying writer.
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut writer)
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send + 'static> LogSink for WriterSink<W> {
    fn emit(&self, message: &str, fields: &Fields) {
        let mut line = format!("level=info msg={}", quote_if_needed(message));
        if !fields.is_empty() {
            line.push(' ');
            line.push_str(&render_fields(fields));
        }
        line.push('\n');

        let result = self.with_writer(|w| w.write_all(line.as_bytes()).and_then(|()| w.flush()));
        if let Err(e) = result {
            warn!(error = %e, "Failed to write request log record");
        }
    }
}

/// Sink that writes one JSON object per line to any [`Write`] destination.
///
/// Each line carries `level`, `msg` and the record's fields as top level keys. Durations are
/// rendered as strings the same way [`WriterSink`] renders them.
///
/// # Examples
///
/// ```rust
/// use reqlog::{Fields, JsonSink, LogSink};
///
/// let sink = JsonSink::new(Vec::new());
/// let mut fields = Fields::new();
/// fields.insert("http_status".into(), 200u16.into());
/// sink.emit("Request received", &fields);
///
/// let output = String::from_utf8(sink.into_inner()).unwrap();
/// assert_eq!(output, "{\"level\":\"info\",\"msg\":\"Request received\",\"http_status\":200}\n");
/// ```
#[derive(Debug, Default)]
pub struct JsonSink<W> {
    writer: Mutex<W>,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    level: &'static str,
    msg: &'a str,
    #[serde(flatten)]
    fields: &'a Fields,
}

impl<W: Write + Send + 'static> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send + 'static> LogSink for JsonSink<W> {
    fn emit(&self, message: &str, fields: &Fields) {
        let line = JsonLine {
            level: "info",
            msg: message,
            fields,
        };
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let result = serde_json::to_writer(&mut *writer, &line)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush());
        if let Err(e) = result {
            warn!(error = %e, "Failed to write request log record");
        }
    }
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records emitted so far, oldest first.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn emit(&self, message: &str, fields: &Fields) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogRecord {
                message: message.to_owned(),
                fields: fields.clone(),
            });
    }
}
