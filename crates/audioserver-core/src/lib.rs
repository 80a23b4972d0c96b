//! # audioserver-core
//!
//! I/O-free building blocks for the audioserver front end:
//!
//! - **`protocol`** – HTTP/1.x request head parsing, an incremental body
//!   decoder (length-delimited and chunked), response head encoding and
//!   query-string decoding.
//! - **`domain`** – upload naming and per-session run ids.
//!
//! The crate has no dependency on sockets or an async runtime; the server
//! crate feeds it bytes and writes what it returns.

pub mod domain;
pub mod protocol;

pub use domain::names::{NameGenerator, UploadName};
pub use domain::run_id::RunIdCounter;
pub use protocol::{
    BodyDecoder, Decoded, Method, ProtocolError, Request, RequestHead, Response, ResponseHead,
    Status, Version,
};
