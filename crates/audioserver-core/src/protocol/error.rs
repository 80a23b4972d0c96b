//! Error type shared by the request parser and body decoder.

use thiserror::Error;

/// Errors that can occur while parsing an HTTP/1.x request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The request line is not `METHOD SP target SP version`.
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),

    /// The version token is neither `HTTP/1.0` nor `HTTP/1.1`.
    #[error("unsupported HTTP version: {0}")]
    UnsupportedVersion(String),

    /// A header line has no colon or an invalid field name.
    #[error("malformed header field: {0:?}")]
    MalformedHeader(String),

    /// The request head is not valid UTF-8.
    #[error("request head is not valid UTF-8")]
    InvalidEncoding,

    /// `Content-Length` is not a decimal integer, or several values disagree.
    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// A transfer coding other than `chunked` was requested.
    #[error("unsupported transfer-encoding: {0}")]
    UnsupportedTransferEncoding(String),

    /// A chunk-size line could not be parsed, or chunk framing is broken.
    #[error("malformed chunk: {0}")]
    MalformedChunk(String),
}
