use axum::{
    body::{Body, Bytes},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use reqlog::{MultiSink, RequestLogger, RequestLoggerConfig, TracingSink, WriterSink};
use std::{net::SocketAddr, time::Duration};
use tokio::{net::TcpListener, time::sleep};
use tracing::{info, Level};

// Test handlers for our demo server
async fn hello_handler() -> impl IntoResponse {
    sleep(Duration::from_millis(100)).await; // Simulate some work
    "Hello, World!"
}

async fn echo_handler(body: Bytes) -> impl IntoResponse {
    format!("Echo: {}", String::from_utf8_lossy(&body))
}

async fn fail_handler() -> impl IntoResponse {
    (StatusCode::BAD_GATEWAY, "Bad Gateway")
}

async fn streaming_handler() -> impl IntoResponse {
    use futures::stream;
    use tokio::time::interval;

    let stream = stream::unfold(0u32, |count| async move {
        if count >= 5 {
            None
        } else {
            let mut interval = interval(Duration::from_millis(200));
            interval.tick().await;
            Some((
                Ok::<_, std::convert::Infallible>(Bytes::from(format!("chunk-{count}\n"))),
                count + 1,
            ))
        }
    });

    Response::builder()
        .header("content-type", "text/plain")
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn health_handler() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    info!("Starting request logger demo server");

    // Records go both to tracing and as logfmt lines to stderr
    let sink = MultiSink::new()
        .with(TracingSink)
        .with(WriterSink::new(std::io::stderr()));

    let config = RequestLoggerConfig::default()
        .with_remote_address_headers(["X-Real-IP", "X-Forwarded-For"])
        .with_custom_field("service", "demo")
        .with_ignored_path("/health")
        .with_sink(sink);
    let logger = RequestLogger::new(config);

    let app = Router::new()
        .route("/hello", get(hello_handler))
        .route("/echo", post(echo_handler))
        .route("/fail", get(fail_handler))
        .route("/streaming", get(streaming_handler))
        .route("/health", get(health_handler))
        .layer(logger.layer());

    info!("Demo server endpoints:");
    info!("  GET  /hello      - Simple greeting");
    info!("  POST /echo       - Echo request body");
    info!("  GET  /fail       - Error status");
    info!("  GET  /streaming  - Streaming response, logged once the last chunk is sent");
    info!("  GET  /health     - Never logged");
    info!("");
    info!("Try these commands:");
    info!("  curl http://localhost:3000/hello");
    info!("  curl -H 'X-Real-IP: 98.76.54.32' http://localhost:3000/hello");
    info!("  curl -X POST -d 'Hello from client' http://localhost:3000/echo");
    info!("  curl http://localhost:3000/streaming");

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    info!("Demo server listening on http://localhost:3000");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
