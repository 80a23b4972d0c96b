//! End-to-end tests over real loopback TCP connections.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use audioserver_core::{Method, UploadName};
use audioserver_web::application::{ConnectionRegistry, RoutingTable};
use audioserver_web::domain::{Limits, MatchMode, RestReply};
use audioserver_web::infrastructure::{Listener, SessionContext, SessionFactory};
use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Starts a server on an ephemeral port and returns its address.
fn start(root: &Path, routes: RoutingTable) -> SocketAddr {
    let ctx = SessionContext {
        routes: Arc::new(routes),
        document_root: root.to_path_buf(),
        websocket_path: "/dynamic".to_string(),
        limits: Limits::default(),
    };
    let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), SessionFactory::new(ctx));
    let addr = listener.local_addr().expect("listener must bind");
    tokio::spawn(listener.run());
    addr
}

/// Sends `request` and reads until the server closes the connection.
async fn roundtrip(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(TIMEOUT, stream.read_to_end(&mut response))
        .await
        .expect("server must close the connection")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn test_missing_file_returns_404_with_target() {
    let root = tempfile::tempdir().unwrap();
    let addr = start(root.path(), RoutingTable::new());

    let response = roundtrip(addr, b"GET /nothing.html HTTP/1.1\r\nHost: x\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(response.contains("Server: audioserver/"));
    assert!(response.ends_with("/nothing.html"));
}

#[tokio::test]
async fn test_rest_route_returns_handler_body() {
    // Arrange
    let root = tempfile::tempdir().unwrap();
    let mut routes = RoutingTable::new();
    routes.register_rest_route("/database", Method::Get, MatchMode::Exact, |req| {
        match req.query_param("uid").as_deref() {
            Some("none") => RestReply::json("[]"),
            _ => RestReply::empty(),
        }
    });
    let addr = start(root.path(), routes);

    // Act
    let response = roundtrip(addr, b"GET /database?uid=none HTTP/1.1\r\n\r\n").await;

    // Assert
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Type: application/json\r\n"));
    assert!(response.contains("Content-Length: 2\r\n"));
    assert!(response.ends_with("\r\n\r\n[]"));
}

#[tokio::test]
async fn test_large_upload_is_stored_and_completion_runs_once() {
    // Arrange
    let root = tempfile::tempdir().unwrap();
    let upload_dir = root.path().to_path_buf();
    let completions = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&completions);
    let mut routes = RoutingTable::new();
    routes.register_upload_route(
        "/upload",
        move || UploadName::new(&upload_dir, "id123", ".mp3"),
        move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            true
        },
    );
    let addr = start(root.path(), routes);
    let body: Vec<u8> = (0..5 * 1024 * 1024).map(|i| (i % 251) as u8).collect();

    // Act
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let head = format!(
        "POST /upload HTTP/1.1\r\nContent-Type: audio/mpeg\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await.unwrap();
    for chunk in body.chunks(64 * 1024) {
        stream.write_all(chunk).await.unwrap();
    }
    let mut response = Vec::new();
    tokio::time::timeout(TIMEOUT, stream.read_to_end(&mut response))
        .await
        .expect("server must answer the upload")
        .unwrap();

    // Assert
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Type: audio/mp3\r\n"));
    assert!(response.contains("Content-Length: 0\r\n"));
    let stored = std::fs::read(root.path().join("id123.mp3")).unwrap();
    assert_eq!(stored.len(), body.len());
    assert!(stored == body);
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_broadcast_reaches_every_websocket_client() {
    // Arrange
    let root = tempfile::tempdir().unwrap();
    let routes = RoutingTable::new();
    let registry: Arc<ConnectionRegistry> = Arc::clone(routes.websockets());
    let addr = start(root.path(), routes);
    let url = format!("ws://{addr}/dynamic");

    let (mut first, _) = connect_async(url.as_str()).await.unwrap();
    let (mut second, _) = connect_async(url.as_str()).await.unwrap();
    tokio::time::timeout(TIMEOUT, async {
        while registry.connection_count() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("both clients must register");

    // Act
    let reached = registry.broadcast("ping");

    // Assert
    assert_eq!(reached, 2);
    for client in [&mut first, &mut second] {
        let frame = tokio::time::timeout(TIMEOUT, client.next())
            .await
            .expect("frame expected")
            .unwrap()
            .unwrap();
        assert_eq!(frame.into_text().unwrap(), "ping");
    }
}

#[tokio::test]
async fn test_closed_websocket_client_is_deregistered() {
    let root = tempfile::tempdir().unwrap();
    let routes = RoutingTable::new();
    let registry = Arc::clone(routes.websockets());
    let addr = start(root.path(), routes);

    let (mut client, _) = connect_async(format!("ws://{addr}/dynamic")).await.unwrap();
    tokio::time::timeout(TIMEOUT, async {
        while registry.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("client must register");

    client.close(None).await.unwrap();

    tokio::time::timeout(TIMEOUT, async {
        while !registry.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("closed client must be removed");
    assert_eq!(registry.broadcast("late"), 0);
}

#[tokio::test]
async fn test_traversal_target_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let addr = start(root.path(), RoutingTable::new());

    let response = roundtrip(addr, b"GET /../etc/passwd HTTP/1.1\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(response.ends_with("Illegal request-target"));
}

#[tokio::test]
async fn test_unknown_method_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let addr = start(root.path(), RoutingTable::new());

    let response = roundtrip(addr, b"DELETE /a.mp3 HTTP/1.1\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(response.ends_with("Unknown HTTP-method"));
}

#[tokio::test]
async fn test_keep_alive_request_is_answered_then_closed() {
    // Arrange
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("index.html"), "home").unwrap();
    let addr = start(root.path(), RoutingTable::new());

    // Act: roundtrip only returns once the server closes.
    let response = roundtrip(addr, b"GET / HTTP/1.1\r\nConnection: keep-alive\r\n\r\n").await;

    // Assert: the flag is echoed even though the connection is not reused.
    assert_eq!(response.matches("HTTP/1.1 200 OK").count(), 1);
    assert!(response.contains("Connection: keep-alive\r\n"));
    assert!(response.ends_with("home"));
}

#[tokio::test]
async fn test_head_request_omits_body() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("song.mp3"), vec![0u8; 1000]).unwrap();
    let addr = start(root.path(), RoutingTable::new());

    let response = roundtrip(addr, b"HEAD /song.mp3 HTTP/1.1\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Type: audio/mpeg\r\n"));
    assert!(response.contains("Content-Length: 1000\r\n"));
    assert!(response.ends_with("\r\n\r\n"));
}

#[tokio::test]
async fn test_pipelined_second_request_is_never_served() {
    // Arrange
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("a.txt"), "alpha").unwrap();
    std::fs::write(root.path().join("b.txt"), "bravo").unwrap();
    let addr = start(root.path(), RoutingTable::new());

    // Act: both requests arrive in the same write.
    let response = roundtrip(
        addr,
        b"GET /a.txt HTTP/1.1\r\nConnection: keep-alive\r\n\r\n\
          GET /b.txt HTTP/1.1\r\nConnection: keep-alive\r\n\r\n",
    )
    .await;

    // Assert
    assert_eq!(response.matches("HTTP/1.1 ").count(), 1);
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("alpha"));
    assert!(!response.contains("bravo"));
}
