use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use reqlog::{
    handler_fn,
    types::{HTTP_DURATION, HTTP_SIZE, HTTP_STATUS},
    ConnectionHijacker, FieldValue, Fields, Handler, LogSink, MemorySink, ObserverError,
    RawConnection, RequestLogger, RequestLoggerConfig, RequestSnapshot, ResponseRecorder,
    ResponseWriter, WriterSink,
};
use std::{
    io::{self, Cursor, Read, Write},
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

fn bar_handler() -> impl Handler {
    handler_fn(|w, _req| {
        let _ = w.write_all(b"bar");
    })
}

fn bad_gateway_handler() -> impl Handler {
    handler_fn(|w, _req| {
        w.headers_mut()
            .insert("content-type", HeaderValue::from_static("text/plain; charset=utf-8"));
        w.set_status(StatusCode::BAD_GATEWAY);
        let _ = w.write_all(b"Bad Gateway\n");
    })
}

/// Logger writing text lines into a buffer we can inspect
fn buffered_logger(config: RequestLoggerConfig) -> (RequestLogger, Arc<WriterSink<Vec<u8>>>) {
    let sink = Arc::new(WriterSink::new(Vec::new()));
    let logger = RequestLogger::new(config.with_shared_sink(sink.clone()));
    (logger, sink)
}

fn output(sink: &WriterSink<Vec<u8>>) -> String {
    sink.with_writer(|buf| String::from_utf8(buf.clone()).unwrap())
}

fn get(uri: &str) -> RequestSnapshot {
    RequestSnapshot::new(Method::GET, uri)
}

fn with_headers(request: RequestSnapshot, headers: &[(&'static str, &'static str)]) -> RequestSnapshot {
    headers.iter().fold(request, |req, (name, value)| {
        req.with_header(HeaderName::from_static(*name), HeaderValue::from_static(*value))
    })
}

#[test]
fn test_no_config() {
    let logger = RequestLogger::default();

    let mut res = ResponseRecorder::new();
    let req = get("/should/be/stdout/").with_remote_addr("111.222.333.444");
    logger.handler(bar_handler()).serve(&mut res, &req);

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body_str(), "bar");
}

#[test]
fn test_default_config() {
    let (logger, sink) = buffered_logger(RequestLoggerConfig::default());

    let mut res = ResponseRecorder::new();
    let url = "/foo/wow?q=search-term&print=1#comments";
    logger.handler(bar_handler()).serve(&mut res, &get(url));

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body_str(), "bar");

    let out = output(&sink);
    assert!(out.starts_with("level=info msg=\"Request received\""));
    assert!(out.contains("http_status=200"));
    assert!(out.contains("http_method=GET"));
    assert!(out.contains(&format!("http_uri=\"{url}\"")));
    assert!(out.contains("http_size=3"));
    assert!(out.contains("http_proto=HTTP/1.1"));
}

#[test]
fn test_default_config_post_error() {
    let (logger, sink) = buffered_logger(RequestLoggerConfig::default());

    let mut res = ResponseRecorder::new();
    let req = RequestSnapshot::new(Method::POST, "/foo");
    logger.handler(bad_gateway_handler()).serve(&mut res, &req);

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.body_str().trim(), "Bad Gateway");
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "text/plain; charset=utf-8"
    );

    let out = output(&sink);
    assert!(out.contains("http_status=502"));
    assert!(out.contains("http_method=POST"));
}

#[test]
fn test_last_status_wins() {
    let sink = Arc::new(MemorySink::new());
    let logger = RequestLogger::new(RequestLoggerConfig::default().with_shared_sink(sink.clone()));
    let app = logger.handler(handler_fn(|w, _req| {
        w.set_status(StatusCode::ACCEPTED);
        w.set_status(StatusCode::CREATED);
        let _ = w.write_all(b"{}");
    }));

    let mut res = ResponseRecorder::new();
    app.serve(&mut res, &get("/foo"));

    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(sink.records()[0].field("http_status"), Some(&FieldValue::Uint(201)));
}

#[test]
fn test_response_size() {
    let (logger, sink) = buffered_logger(RequestLoggerConfig::default());

    let mut res = ResponseRecorder::new();
    logger.handler(bar_handler()).serve(&mut res, &get("/foo"));

    assert!(output(&sink).contains("http_size=3"));
}

#[test]
fn test_response_size_counts_short_writes() {
    let sink = Arc::new(MemorySink::new());
    let logger = RequestLogger::new(RequestLoggerConfig::default().with_shared_sink(sink.clone()));
    let app = logger.handler(handler_fn(|w, _req| {
        // A single write that the channel only partially accepts
        let written = w.write(b"hello world").unwrap();
        assert_eq!(written, 4);
    }));

    let mut res = ResponseRecorder::new().with_write_limit(4);
    app.serve(&mut res, &get("/foo"));

    assert_eq!(res.body_str(), "hell");
    assert_eq!(sink.records()[0].field("http_size"), Some(&FieldValue::Uint(4)));
}

#[test]
fn test_failed_write_still_logged() {
    let sink = Arc::new(MemorySink::new());
    let logger = RequestLogger::new(RequestLoggerConfig::default().with_shared_sink(sink.clone()));
    let app = logger.handler(handler_fn(|w, _req| {
        w.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        let err = w.write_all(b"oops").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }));

    let mut res = ResponseRecorder::new().failing_with(std::io::ErrorKind::BrokenPipe);
    app.serve(&mut res, &get("/foo"));

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].field("http_status"), Some(&FieldValue::Uint(500)));
    assert_eq!(records[0].field("http_size"), Some(&FieldValue::Uint(0)));
}

#[test]
fn test_custom_message() {
    let (logger, sink) =
        buffered_logger(RequestLoggerConfig::default().with_message("some message"));

    let mut res = ResponseRecorder::new();
    logger.handler(bar_handler()).serve(&mut res, &get("/foo"));

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body_str(), "bar");

    let out = output(&sink);
    assert!(out.contains("http_status=200"));
    assert!(out.contains("http_method=GET"));
    assert!(out.contains("msg=\"some message\""));
}

#[test]
fn test_custom_fields() {
    let (logger, sink) = buffered_logger(
        RequestLoggerConfig::default()
            .with_custom_field("foo", "bar")
            .with_custom_field("http_status", "overridden"),
    );

    let mut res = ResponseRecorder::new();
    logger.handler(bar_handler()).serve(&mut res, &get("/foo"));

    let out = output(&sink);
    assert!(out.contains("foo=bar"));
    assert!(out.contains("http_status=overridden"));
    assert!(!out.contains("http_status=200"));
}

#[test]
fn test_default_remote_address() {
    let (logger, sink) = buffered_logger(RequestLoggerConfig::default());

    let mut res = ResponseRecorder::new();
    let req = with_headers(get("/foo").with_remote_addr("8.8.4.4"), &[("x-real-ip", "98.76.54.32")]);
    logger.handler(bar_handler()).serve(&mut res, &req);

    let out = output(&sink);
    assert!(out.contains("http_addr=8.8.4.4"));
    assert!(!out.contains("http_addr=98.76.54.32"));
}

#[test]
fn test_remote_address_with_header() {
    let (logger, sink) =
        buffered_logger(RequestLoggerConfig::default().with_remote_address_headers(["X-Forwarded-Proto"]));

    let mut res = ResponseRecorder::new();
    let req = with_headers(
        get("/foo").with_remote_addr("8.8.4.4"),
        &[("x-forwarded-proto", "12.34.56.78")],
    );
    logger.handler(bar_handler()).serve(&mut res, &req);

    let out = output(&sink);
    assert!(out.contains("http_addr=12.34.56.78"));
    assert!(!out.contains("http_addr=8.8.4.4"));
}

#[test]
fn test_remote_address_with_header_fallback() {
    let (logger, sink) =
        buffered_logger(RequestLoggerConfig::default().with_remote_address_headers(["X-Forwarded-Proto"]));

    let mut res = ResponseRecorder::new();
    logger
        .handler(bar_handler())
        .serve(&mut res, &get("/foo").with_remote_addr("8.8.4.4"));

    assert!(output(&sink).contains("http_addr=8.8.4.4"));
}

#[test]
fn test_remote_address_multiples() {
    let (logger, sink) = buffered_logger(
        RequestLoggerConfig::default().with_remote_address_headers(["X-Real-IP", "X-Forwarded-Proto"]),
    );

    let mut res = ResponseRecorder::new();
    let req = with_headers(
        get("/foo").with_remote_addr("8.8.4.4"),
        &[("x-forwarded-proto", "12.34.56.78"), ("x-real-ip", "98.76.54.32")],
    );
    logger.handler(bar_handler()).serve(&mut res, &req);

    let out = output(&sink);
    assert!(out.contains("http_addr=98.76.54.32"));
    assert!(!out.contains("http_addr=12.34.56.78"));
    assert!(!out.contains("http_addr=8.8.4.4"));
}

#[test]
fn test_remote_address_multiples_fallback() {
    let (logger, sink) = buffered_logger(
        RequestLoggerConfig::default().with_remote_address_headers(["X-Real-IP", "X-Forwarded-Proto"]),
    );

    let mut res = ResponseRecorder::new();
    let req = with_headers(
        get("/foo").with_remote_addr("8.8.4.4"),
        &[("x-forwarded-proto", "12.34.56.78")],
    );
    logger.handler(bar_handler()).serve(&mut res, &req);

    let out = output(&sink);
    assert!(!out.contains("http_addr=98.76.54.32"));
    assert!(out.contains("http_addr=12.34.56.78"));
    assert!(!out.contains("http_addr=8.8.4.4"));
}

#[test]
fn test_ignored_uris_no_match() {
    let (logger, sink) =
        buffered_logger(RequestLoggerConfig::default().with_ignored_path("/favicon.ico"));

    let mut res = ResponseRecorder::new();
    logger.handler(bar_handler()).serve(&mut res, &get("/foo"));

    let out = output(&sink);
    assert!(out.contains("http_status=200"));
    assert!(out.contains("http_method=GET"));
}

#[test]
fn test_ignored_uris_matching() {
    let (logger, sink) = buffered_logger(
        RequestLoggerConfig::default()
            .with_ignored_path("/favicon.ico")
            .with_ignored_path("/foo"),
    );

    let mut res = ResponseRecorder::new();
    logger.handler(bar_handler()).serve(&mut res, &get("/foo"));

    // The response is untouched, only the record is skipped
    assert_eq!(res.body_str(), "bar");
    assert_eq!(output(&sink), "");
}

#[test]
fn test_one_record_per_request() {
    let sink = Arc::new(MemorySink::new());
    let logger = RequestLogger::new(RequestLoggerConfig::default().with_shared_sink(sink.clone()));
    let app = logger.handler(bar_handler());

    for uri in ["/a", "/b", "/c"] {
        let mut res = ResponseRecorder::new();
        app.serve(&mut res, &get(uri));
    }

    let uris: Vec<_> = sink
        .records()
        .iter()
        .map(|r| r.field("http_uri").unwrap().to_string())
        .collect();
    assert_eq!(uris, vec!["/a", "/b", "/c"]);
}

#[test]
fn test_record_emitted_after_handler_returns() {
    /// Sink that checks the response body is complete when it is called
    struct CheckingSink {
        seen: std::sync::Mutex<Vec<String>>,
    }

    impl LogSink for CheckingSink {
        fn emit(&self, _message: &str, fields: &Fields) {
            self.seen
                .lock()
                .unwrap()
                .push(fields["http_size"].to_string());
        }
    }

    let sink = Arc::new(CheckingSink {
        seen: std::sync::Mutex::new(Vec::new()),
    });
    let logger = RequestLogger::new(RequestLoggerConfig::default().with_shared_sink(sink.clone()));
    let app = logger.handler(handler_fn(|w, _req| {
        for _ in 0..3 {
            let _ = w.write_all(b"part");
        }
    }));

    let mut res = ResponseRecorder::new();
    app.serve(&mut res, &get("/foo"));

    assert_eq!(*sink.seen.lock().unwrap(), vec!["12"]);
}

#[test]
fn test_duration_covers_handler_time() {
    let sink = Arc::new(MemorySink::new());
    let logger = RequestLogger::new(RequestLoggerConfig::default().with_shared_sink(sink.clone()));
    let app = logger.handler(handler_fn(|w, _req| {
        std::thread::sleep(Duration::from_millis(20));
        let _ = w.write_all(b"slow");
    }));

    let mut res = ResponseRecorder::new();
    app.serve(&mut res, &get("/slow"));

    let records = sink.records();
    let Some(FieldValue::Duration(duration)) = records[0].field(HTTP_DURATION) else {
        panic!("duration field missing");
    };
    assert!(*duration >= Duration::from_millis(20));
}

#[test]
fn test_panicking_handler_emits_nothing() {
    let sink = Arc::new(MemorySink::new());
    let logger = RequestLogger::new(RequestLoggerConfig::default().with_shared_sink(sink.clone()));
    let app = logger.handler(handler_fn(|w, _req| {
        w.set_status(StatusCode::OK);
        panic!("handler blew up");
    }));

    let result = catch_unwind(AssertUnwindSafe(|| {
        let mut res = ResponseRecorder::new();
        app.serve(&mut res, &get("/boom"));
    }));

    assert!(result.is_err());
    assert!(sink.is_empty());
}

#[test]
fn test_flush_reaches_channel_through_logger() {
    let logger = RequestLogger::new(RequestLoggerConfig::default().with_sink(MemorySink::new()));
    let app = logger.handler(handler_fn(|w, _req| {
        let _ = w.write_all(b"event: tick\n\n");
        if let Some(flusher) = w.as_flusher() {
            flusher.flush();
        }
    }));

    let mut res = ResponseRecorder::new();
    app.serve(&mut res, &get("/events"));
    assert_eq!(res.flush_count(), 1);

    // Channels without flush are not an error
    let mut res = ResponseRecorder::new().without_flush();
    app.serve(&mut res, &get("/events"));
    assert_eq!(res.flush_count(), 0);
    assert_eq!(res.body_str(), "event: tick\n\n");
}

#[test]
fn test_hijack_unsupported_through_logger() {
    let outcome = Arc::new(std::sync::Mutex::new(None));
    let seen = outcome.clone();

    let logger = RequestLogger::new(RequestLoggerConfig::default().with_sink(MemorySink::new()));
    let app = logger.handler(handler_fn(move |w, _req| {
        let result = match w.as_hijacker() {
            Some(hijacker) => hijacker.hijack().map(|_| ()),
            None => Ok(()),
        };
        if let Err(e) = result {
            *seen.lock().unwrap() = Some(matches!(e, ObserverError::HijackUnsupported));
            w.set_status(StatusCode::NOT_IMPLEMENTED);
        }
    }));

    let mut res = ResponseRecorder::new();
    app.serve(&mut res, &get("/ws"));

    assert_eq!(*outcome.lock().unwrap(), Some(true));
    assert_eq!(res.status(), StatusCode::NOT_IMPLEMENTED);
}

/// Channel whose connection can be taken over, like an HTTP/1.1 upgrade
struct UpgradableChannel {
    headers: HeaderMap,
    status: StatusCode,
    conn: Option<Cursor<Vec<u8>>>,
}

impl ResponseWriter for UpgradableChannel {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn as_hijacker(&mut self) -> Option<&mut dyn ConnectionHijacker> {
        Some(self)
    }
}

impl ConnectionHijacker for UpgradableChannel {
    fn hijack(&mut self) -> Result<Box<dyn RawConnection>, ObserverError> {
        self.conn
            .take()
            .map(|conn| Box::new(conn) as Box<dyn RawConnection>)
            .ok_or(ObserverError::HijackUnsupported)
    }
}

#[test]
fn test_hijack_through_logger_still_logs() {
    let received = Arc::new(std::sync::Mutex::new(String::new()));
    let seen = received.clone();

    let sink = Arc::new(MemorySink::new());
    let logger = RequestLogger::new(RequestLoggerConfig::default().with_shared_sink(sink.clone()));
    let app = logger.handler(handler_fn(move |w, _req| {
        w.set_status(StatusCode::SWITCHING_PROTOCOLS);
        let Some(hijacker) = w.as_hijacker() else {
            return;
        };
        let mut conn = hijacker.hijack().unwrap();
        conn.read_to_string(&mut seen.lock().unwrap()).unwrap();
        conn.write_all(b"pong").unwrap();
    }));

    let mut channel = UpgradableChannel {
        headers: HeaderMap::new(),
        status: StatusCode::OK,
        conn: Some(Cursor::new(b"ping".to_vec())),
    };
    app.serve(&mut channel, &get("/ws"));

    assert_eq!(*received.lock().unwrap(), "ping");
    assert!(channel.conn.is_none());
    assert_eq!(channel.status, StatusCode::SWITCHING_PROTOCOLS);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].field(HTTP_STATUS), Some(&FieldValue::Uint(101)));
    assert_eq!(records[0].field(HTTP_SIZE), Some(&FieldValue::Uint(0)));
}

#[test]
fn test_default_and_explicit_defaults_match() {
    let request = get("/foo").with_remote_addr("1.2.3.4");

    let implicit = Arc::new(MemorySink::new());
    let explicit = Arc::new(MemorySink::new());
    let implicit_logger =
        RequestLogger::new(RequestLoggerConfig::default().with_shared_sink(implicit.clone()));
    let explicit_logger = RequestLogger::new(RequestLoggerConfig {
        message: "Request received".to_owned(),
        custom_fields: Default::default(),
        remote_address_headers: Vec::new(),
        ignored_paths: Default::default(),
        sink: explicit.clone(),
    });

    for logger in [&implicit_logger, &explicit_logger] {
        let mut res = ResponseRecorder::new();
        logger.handler(bar_handler()).serve(&mut res, &request);
    }

    fn comparable(sink: &MemorySink) -> (String, Fields) {
        let record = sink.records().remove(0);
        let mut fields = record.fields;
        fields.remove(HTTP_DURATION);
        (record.message, fields)
    }
    assert_eq!(comparable(&implicit), comparable(&explicit));
}
