//! Response head encoding.
//!
//! Every response written by the server carries the same four fields:
//! `Server`, `Content-Type`, `Content-Length` and `Connection`.  The body is
//! written separately so that large files can be streamed after the head.

use std::fmt::Write as _;

use crate::protocol::request::Version;

/// Value of the `Server` header on every response and handshake.
pub const SERVER_NAME: &str = concat!("audioserver/", env!("CARGO_PKG_VERSION"));

/// Content type used when a response does not name one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// Status codes emitted by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    SwitchingProtocols,
    Ok,
    BadRequest,
    NotFound,
    PayloadTooLarge,
    InternalServerError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::SwitchingProtocols => 101,
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::PayloadTooLarge => 413,
            Status::InternalServerError => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::SwitchingProtocols => "Switching Protocols",
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::PayloadTooLarge => "Payload Too Large",
            Status::InternalServerError => "Internal Server Error",
        }
    }
}

/// Status line plus the fixed header set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub version: Version,
    pub status: Status,
    pub content_type: String,
    pub content_length: u64,
    /// Echo of the request's keep-alive flag.
    pub keep_alive: bool,
}

impl ResponseHead {
    pub fn new(status: Status) -> Self {
        Self {
            version: Version::Http11,
            status,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            content_length: 0,
            keep_alive: false,
        }
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn content_length(mut self, length: u64) -> Self {
        self.content_length = length;
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Serialises the head, blank line included.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use audioserver_core::protocol::{ResponseHead, Status};
    ///
    /// let bytes = ResponseHead::new(Status::NotFound).content_length(3).encode();
    /// assert!(bytes.starts_with(b"HTTP/1.1 404 Not Found\r\n"));
    /// assert!(bytes.ends_with(b"\r\n\r\n"));
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::with_capacity(160);
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "{} {} {}\r\nServer: {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: {}\r\n\r\n",
            self.version.as_str(),
            self.status.code(),
            self.status.reason(),
            SERVER_NAME,
            self.content_type,
            self.content_length,
            if self.keep_alive { "keep-alive" } else { "close" },
        );
        out.into_bytes()
    }
}

/// Encodes the `101 Switching Protocols` answer to a WebSocket handshake.
///
/// `accept_key` is the already derived `Sec-WebSocket-Accept` value.
pub fn switching_protocols(accept_key: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {} {}\r\nServer: {}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        Status::SwitchingProtocols.code(),
        Status::SwitchingProtocols.reason(),
        SERVER_NAME,
        accept_key,
    )
    .into_bytes()
}

/// A complete in-memory response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub head: ResponseHead,
    pub body: Vec<u8>,
}

impl Response {
    /// Builds a response whose `Content-Length` matches `body`.
    pub fn new(status: Status, content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        let head = ResponseHead::new(status)
            .content_type(content_type)
            .content_length(body.len() as u64);
        Self { head, body }
    }

    /// `text/html` response carrying a plain message.
    pub fn message(status: Status, message: impl Into<String>) -> Self {
        Self::new(status, DEFAULT_CONTENT_TYPE, message.into().into_bytes())
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.head.keep_alive = keep_alive;
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.head.version = version;
        self
    }

    /// Head followed by body.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.head.encode();
        out.extend_from_slice(&self.body);
        out
    }
}
