//! Composite sink for fanning records out to several destinations.
//!
//! # Example
//!
//! ```rust
//! use reqlog::{MultiSink, TracingSink, WriterSink};
//!
//! let sink = MultiSink::new()
//!     .with(TracingSink)
//!     .with(WriterSink::new(std::io::stderr()));
//! assert_eq!(sink.len(), 2);
//! ```

use std::sync::Arc;

use crate::sink::LogSink;
use crate::types::Fields;

/// A sink that forwards every record to each inner sink, in the order they were added.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Add a sink to the chain. Returns self for builder pattern.
    pub fn with<S: LogSink>(mut self, sink: S) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }
}

impl LogSink for MultiSink {
    fn emit(&self, message: &str, fields: &Fields) {
        for sink in &self.sinks {
            sink.emit(message, fields);
        }
    }
}
