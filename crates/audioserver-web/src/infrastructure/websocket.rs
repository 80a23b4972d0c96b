//! WebSocket session: one upgraded connection.
//!
//! The HTTP session has already read and validated the upgrade request.  This
//! module answers it with `101 Switching Protocols`, wraps the stream in
//! `tokio-tungstenite`, registers an [`Outbox`] with the connection registry
//! and then runs two halves:
//!
//! - **reader**: consumes inbound frames only to notice a close or an error;
//!   payloads are ignored and pings are answered by tungstenite;
//! - **writer**: drains the outbox one message at a time, so at most one
//!   frame per connection is ever being written.
//!
//! Whichever half finishes first ends the session.  The registry entry is
//! released by a drop guard, so no exit path leaves a dangling registration.

use std::net::SocketAddr;
use std::sync::Arc;

use audioserver_core::protocol::switching_protocols;
use audioserver_core::RequestHead;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    handshake::derive_accept_key, protocol::Role, Error as WsError, Message,
};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::application::broadcast::{ConnectionHandle, ConnectionRegistry, Outbox};
use crate::infrastructure::error::SessionError;

/// Releases the registry entry when the session ends.
struct Registration {
    registry: Arc<ConnectionRegistry>,
    handle: ConnectionHandle,
    peer: SocketAddr,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.registry.release(self.handle) {
            debug!("websocket peer {} deregistered", self.peer);
        }
    }
}

/// An accepted WebSocket connection.
pub struct WebsocketSession<S> {
    ws: WebSocketStream<S>,
    peer: SocketAddr,
    outbox: Outbox,
    queue: mpsc::UnboundedReceiver<String>,
    registration: Registration,
}

impl<S> WebsocketSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Completes the handshake and registers the connection.
    ///
    /// `leftover` holds any bytes the HTTP session read past the request
    /// head; they are treated as the first WebSocket bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the `101` response cannot be written.
    pub async fn accept(
        mut stream: S,
        leftover: Vec<u8>,
        peer: SocketAddr,
        head: &RequestHead,
        registry: Arc<ConnectionRegistry>,
    ) -> Result<Self, SessionError> {
        let key = head.header("sec-websocket-key").unwrap_or_default();
        let accept = derive_accept_key(key.as_bytes());
        stream.write_all(&switching_protocols(&accept)).await?;
        stream.flush().await?;

        let ws = WebSocketStream::from_partially_read(stream, leftover, Role::Server, None).await;

        let (outbox, queue) = Outbox::channel();
        let handle = registry.add_connection(outbox.clone(), peer);
        info!("websocket session established with {peer}");

        Ok(Self {
            ws,
            peer,
            outbox,
            queue,
            registration: Registration {
                registry,
                handle,
                peer,
            },
        })
    }

    /// Queues a text message for this connection.
    pub fn write(&self, message: impl Into<String>) -> bool {
        self.outbox.enqueue(message.into())
    }

    /// Registry handle of this connection.
    pub fn handle(&self) -> ConnectionHandle {
        self.registration.handle
    }

    /// Services the connection until the peer closes or an error occurs.
    pub async fn run(self) {
        let Self {
            ws,
            peer,
            outbox,
            mut queue,
            registration,
        } = self;
        // Only the registry may keep the queue alive from here on.
        drop(outbox);

        let (mut sink, mut frames) = ws.split();

        let writer = async {
            while let Some(message) = queue.recv().await {
                sink.send(Message::Text(message)).await?;
            }
            Ok::<(), WsError>(())
        };

        // Reading past a Close lets tungstenite flush its reply; the stream
        // then ends with `ConnectionClosed`.
        let reader = async {
            while let Some(frame) = frames.next().await {
                if let Message::Close(frame) = frame? {
                    debug!("websocket peer {peer} sent close: {frame:?}");
                }
            }
            Ok::<(), WsError>(())
        };

        let outcome = tokio::select! {
            result = reader => result,
            result = writer => result,
        };

        match outcome {
            Ok(()) => info!("websocket session with {peer} closed"),
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                info!("websocket session with {peer} closed")
            }
            Err(e) => warn!("websocket session with {peer} ended with error: {e}"),
        }
        drop(registration);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream};

    const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn upgrade_head() -> RequestHead {
        let raw = format!(
            "GET /dynamic HTTP/1.1\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\
             Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: {KEY}\r\n\r\n"
        );
        RequestHead::parse(raw.as_bytes()).unwrap()
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    /// Reads the handshake response off the client side and returns it.
    async fn read_handshake(client: &mut DuplexStream) -> String {
        let mut raw = Vec::new();
        let mut byte = [0u8; 1];
        while !raw.ends_with(b"\r\n\r\n") {
            client.read_exact(&mut byte).await.unwrap();
            raw.push(byte[0]);
        }
        String::from_utf8(raw).unwrap()
    }

    async fn connect() -> (
        WebsocketSession<DuplexStream>,
        WebSocketStream<DuplexStream>,
        Arc<ConnectionRegistry>,
        String,
    ) {
        let (server_io, mut client_io) = tokio::io::duplex(64 * 1024);
        let registry = Arc::new(ConnectionRegistry::new());
        let session = WebsocketSession::accept(
            server_io,
            Vec::new(),
            peer(),
            &upgrade_head(),
            Arc::clone(&registry),
        )
        .await
        .unwrap();
        let handshake = read_handshake(&mut client_io).await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        (session, client, registry, handshake)
    }

    #[tokio::test]
    async fn test_handshake_carries_accept_key_and_server() {
        let (_session, _client, _registry, handshake) = connect().await;

        assert!(handshake.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        // RFC 6455 section 1.3 sample key/accept pair.
        assert!(handshake.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(handshake.contains("Server: audioserver/"));
    }

    #[tokio::test]
    async fn test_accept_registers_connection() {
        let (session, _client, registry, _) = connect().await;

        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.handle_for(peer()), Some(session.handle()));
    }

    #[tokio::test]
    async fn test_writes_are_delivered_in_order() {
        // Arrange
        let (session, mut client, registry, _) = connect().await;
        assert!(session.write("first"));
        assert!(session.write("second"));
        tokio::spawn(session.run());

        // Act
        registry.broadcast("third");
        let mut received = Vec::new();
        for _ in 0..3 {
            let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
                .await
                .expect("frame expected")
                .unwrap()
                .unwrap();
            received.push(frame.into_text().unwrap());
        }

        // Assert
        assert_eq!(received, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_peer_close_deregisters() {
        // Arrange
        let (session, mut client, registry, _) = connect().await;
        let task = tokio::spawn(session.run());

        // Act
        client.close(None).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("session must end after close")
            .unwrap();

        // Assert
        assert!(registry.is_empty());
        assert_eq!(registry.broadcast("late"), 0);
    }

    #[tokio::test]
    async fn test_peer_close_is_answered_with_close_frame() {
        // Arrange
        let (session, mut client, _registry, _) = connect().await;
        let task = tokio::spawn(session.run());

        // Act
        client.close(None).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("close reply expected");

        // Assert
        assert!(matches!(reply, Some(Ok(Message::Close(_)))));
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("session must end after close")
            .unwrap();
    }
}
