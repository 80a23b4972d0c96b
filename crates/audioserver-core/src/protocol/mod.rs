//! HTTP/1.x request parsing, body decoding and response encoding.

pub mod body;
pub mod error;
pub mod request;
pub mod response;
pub mod url;

pub use body::{BodyDecoder, Decoded};
pub use error::ProtocolError;
pub use request::{find_head_end, strip_query, Method, Request, RequestHead, Version};
pub use response::{
    switching_protocols, Response, ResponseHead, Status, DEFAULT_CONTENT_TYPE, SERVER_NAME,
};
