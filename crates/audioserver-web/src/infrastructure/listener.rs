//! TCP listener and accept loop.
//!
//! [`Listener::bind`] performs the four setup steps (open, set address reuse,
//! bind, listen).  A failing step is logged and leaves the listener inert, so
//! [`Listener::run`] simply returns.  Once running, every accepted connection
//! is handed to the [`ConnectionHandler`] and the next accept starts at once.
//! An accept error is logged and ends the loop; there is no retry.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, error, info};

use crate::infrastructure::error::ServerError;

/// Backlog passed to `listen(2)`.
const LISTEN_BACKLOG: u32 = 1024;

/// Receives each accepted connection.
///
/// Implementations must not block: spawn a task for the connection and
/// return.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn handle(&self, stream: TcpStream, peer: SocketAddr);
}

impl<F> ConnectionHandler for F
where
    F: Fn(TcpStream, SocketAddr) + Send + Sync + 'static,
{
    fn handle(&self, stream: TcpStream, peer: SocketAddr) {
        self(stream, peer)
    }
}

/// A bound (or inert) listening socket plus the handler for its connections.
pub struct Listener {
    endpoint: SocketAddr,
    socket: Option<TcpListener>,
    handler: Arc<dyn ConnectionHandler>,
}

impl Listener {
    /// Opens, configures, binds and listens on `endpoint`.
    ///
    /// Must be called from within a Tokio runtime.  On failure the error is
    /// logged and the returned listener is inert.
    pub fn bind(endpoint: SocketAddr, handler: impl ConnectionHandler) -> Self {
        let socket = match open_socket(endpoint) {
            Ok(socket) => Some(socket),
            Err(e) => {
                error!("{e}");
                None
            }
        };
        Self {
            endpoint,
            socket,
            handler: Arc::new(handler),
        }
    }

    /// Whether setup succeeded.
    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Address actually bound, which differs from the endpoint when port 0
    /// was requested.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Accepts connections until an accept fails.  No-op when inert.
    pub async fn run(self) {
        let Some(socket) = self.socket else {
            debug!("listener on {} is not open; nothing to run", self.endpoint);
            return;
        };
        info!(
            "listening on {}",
            socket.local_addr().unwrap_or(self.endpoint)
        );

        loop {
            match socket.accept().await {
                Ok((stream, peer)) => {
                    debug!("accepted connection from {peer}");
                    self.handler.handle(stream, peer);
                }
                Err(e) => {
                    error!("accept failed on {}: {e}; listener stopped", self.endpoint);
                    return;
                }
            }
        }
    }
}

fn open_socket(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let step = |step: &'static str| move |source| ServerError::Listen { step, addr, source };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(step("open"))?;
    socket.set_reuseaddr(true).map_err(step("set address reuse on"))?;
    socket.bind(addr).map_err(step("bind"))?;
    socket.listen(LISTEN_BACKLOG).map_err(step("listen on"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
