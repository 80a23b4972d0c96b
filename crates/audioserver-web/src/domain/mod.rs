//! Domain layer: configuration and route/handler types.
//!
//! No I/O and no async runtime here; the application and infrastructure
//! layers build on these types.

pub mod config;
pub mod routes;

pub use config::{Limits, ServerConfig, TlsSettings};
pub use routes::{
    MatchMode, NameFactory, RestHandler, RestReply, Route, RouteKind, UploadCompletion,
    VirtualResourceHandler, VirtualResourceKind,
};
