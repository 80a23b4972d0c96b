//! Error types for the network layer.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use audioserver_core::ProtocolError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failure while setting up the listening socket.
#[derive(Debug, Error)]
pub enum ServerError {
    /// One of open / set-reuse / bind / listen failed.
    #[error("failed to {step} listener on {addr}: {source}")]
    Listen {
        step: &'static str,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Failure that ends one connection.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The request line and headers did not fit the configured limit.
    #[error("request head exceeds {limit} bytes")]
    HeadTooLarge { limit: usize },

    /// A buffered body did not fit the configured limit.
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The peer closed the connection in the middle of a request.
    #[error("connection closed before the request was complete")]
    UnexpectedEof,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

/// Failure loading the TLS certificate or key.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] tokio_rustls::rustls::Error),
}
