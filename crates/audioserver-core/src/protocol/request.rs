//! HTTP/1.x request head parsing.
//!
//! Wire format of a request head:
//! ```text
//! METHOD SP request-target SP HTTP/1.x CRLF
//! (field-name ":" OWS field-value OWS CRLF)*
//! CRLF
//! ```
//! The parser is I/O free: callers accumulate bytes until [`find_head_end`]
//! reports a complete head, then hand that slice to [`RequestHead::parse`].

use std::fmt;

use crate::protocol::error::ProtocolError;
use crate::protocol::url;

/// Terminator between the request head and the body.
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

// ── Method / Version ──────────────────────────────────────────────────────────

/// Request method.
///
/// Only `GET`, `HEAD` and `POST` are served; the rest are recognised so the
/// session can reject them with a meaningful message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Patch,
    /// Any other token, kept verbatim.
    Other(String),
}

impl Method {
    /// Parses a method token.  Methods are case-sensitive.
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            other => Method::Other(other.to_string()),
        }
    }

    /// Returns the wire token.
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Other(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol version from the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    fn parse(token: &str) -> Result<Self, ProtocolError> {
        match token {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            other => Err(ProtocolError::UnsupportedVersion(other.to_string())),
        }
    }

    /// Returns the wire token.
    pub fn as_str(self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

// ── Request head ──────────────────────────────────────────────────────────────

/// Parsed request line and header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    /// Raw request-target, query string included.
    pub target: String,
    pub version: Version,
    /// Header fields in arrival order.  Names keep their original case.
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Parses a complete request head.
    ///
    /// `bytes` may include the trailing empty line; anything after the first
    /// `\r\n\r\n` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the request line or any header field is
    /// malformed, or the head is not UTF-8.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use audioserver_core::protocol::{Method, RequestHead};
    ///
    /// let head = RequestHead::parse(b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    /// assert_eq!(head.method, Method::Get);
    /// assert_eq!(head.header("host"), Some("x"));
    /// ```
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let bytes = match find_head_end(bytes) {
            Some(end) => &bytes[..end - HEAD_TERMINATOR.len()],
            None => bytes,
        };
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidEncoding)?;
        let mut lines = text.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split(' ');
        let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(m), Some(t), Some(v), None) if !m.is_empty() && !t.is_empty() => (m, t, v),
            _ => return Err(ProtocolError::MalformedRequestLine(request_line.to_string())),
        };

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            headers.push(parse_header_line(line)?);
        }

        Ok(Self {
            method: Method::parse(method),
            target: target.to_string(),
            version: Version::parse(version)?,
            headers,
        })
    }

    /// Returns the first value of the named header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Iterates every value of the named header (case-insensitive).
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the named comma-separated header contains `token`.
    fn header_has_token(&self, name: &str, token: &str) -> bool {
        self.header_values(name)
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    /// Keep-alive flag as the client requested it.
    ///
    /// HTTP/1.1 defaults to persistent unless `Connection: close` is sent;
    /// HTTP/1.0 only when `Connection: keep-alive` is sent.
    pub fn keep_alive(&self) -> bool {
        match self.version {
            Version::Http11 => !self.header_has_token("connection", "close"),
            Version::Http10 => self.header_has_token("connection", "keep-alive"),
        }
    }

    /// Target path with the query string removed.
    pub fn path(&self) -> &str {
        strip_query(&self.target)
    }

    /// Raw query string after the first `?`, if any.
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, q)| q)
    }

    /// Whether this is a WebSocket opening handshake.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.method == Method::Get
            && self.version == Version::Http11
            && self.header_has_token("connection", "upgrade")
            && self
                .header("upgrade")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
    }

    /// Declared `Content-Length`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidContentLength`] when a value is not a
    /// decimal integer or repeated values disagree.
    pub fn content_length(&self) -> Result<Option<u64>, ProtocolError> {
        let mut declared: Option<u64> = None;
        for raw in self.header_values("content-length").flat_map(|v| v.split(',')) {
            let raw = raw.trim();
            let value = parse_decimal(raw)
                .ok_or_else(|| ProtocolError::InvalidContentLength(raw.to_string()))?;
            match declared {
                Some(existing) if existing != value => {
                    return Err(ProtocolError::InvalidContentLength(raw.to_string()))
                }
                _ => declared = Some(value),
            }
        }
        Ok(declared)
    }

    /// Whether the body uses chunked transfer coding.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnsupportedTransferEncoding`] for any coding
    /// other than `chunked`.
    pub fn is_chunked(&self) -> Result<bool, ProtocolError> {
        let mut chunked = false;
        for coding in self.header_values("transfer-encoding").flat_map(|v| v.split(',')) {
            let coding = coding.trim();
            if coding.is_empty() {
                continue;
            }
            if coding.eq_ignore_ascii_case("chunked") {
                chunked = true;
            } else {
                return Err(ProtocolError::UnsupportedTransferEncoding(coding.to_string()));
            }
        }
        Ok(chunked)
    }
}

fn parse_header_line(line: &str) -> Result<(String, String), ProtocolError> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;
    let valid_name = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !matches!(b, b'(' | b')' | b',' | b'/' | b'[' | b']'));
    if !valid_name {
        return Err(ProtocolError::MalformedHeader(line.to_string()));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_decimal(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

// ── Free helpers ──────────────────────────────────────────────────────────────

/// Returns the offset just past the `\r\n\r\n` that ends the head, if the
/// buffer already holds a complete head.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .map(|pos| pos + HEAD_TERMINATOR.len())
}

/// Returns everything before the first `?`.
pub fn strip_query(target: &str) -> &str {
    match target.find('?') {
        Some(idx) => &target[..idx],
        None => target,
    }
}

// ── Full request ──────────────────────────────────────────────────────────────

/// A request with its body read fully into memory, as handed to REST
/// responders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub head: RequestHead,
    pub body: String,
}

impl Request {
    pub fn new(head: RequestHead, body: String) -> Self {
        Self { head, body }
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn target(&self) -> &str {
        &self.head.target
    }

    pub fn path(&self) -> &str {
        self.head.path()
    }

    /// Raw, still-encoded query string.
    pub fn query(&self) -> Option<&str> {
        self.head.query()
    }

    /// Query parameters, percent-decoded, in order of appearance.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.head.query().map(url::parse_query).unwrap_or_default()
    }

    /// First decoded value of the named query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
