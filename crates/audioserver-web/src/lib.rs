//! audioserver-web library crate.
//!
//! Network front end of the audio server: a minimal HTTP/1.x server that
//! accepts MP3 uploads, answers REST queries, serves the web UI and pushes
//! state to browsers over WebSocket.
//!
//! # Architecture
//!
//! ```text
//! TCP (optionally TLS)
//!         ↕
//! [audioserver-web]
//!   ├── domain/           Configuration, route and handler types
//!   ├── application/      Routing table, request classification,
//!   │                     WebSocket broadcast registry
//!   └── infrastructure/
//!         ├── listener    Accept loop
//!         ├── session     One request per connection
//!         └── websocket   Upgraded connections
//! ```
//!
//! Parsing and encoding live in `audioserver-core`, which has no I/O.
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async runtime.
//! - `application` depends on `domain` and `audioserver-core`.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tokio-tungstenite` and `tokio-rustls`.
//!
//! # Embedding
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use audioserver_core::Method;
//! use audioserver_web::application::RoutingTable;
//! use audioserver_web::domain::{MatchMode, RestReply, ServerConfig};
//! use audioserver_web::infrastructure::{Listener, SessionContext, SessionFactory};
//!
//! # async fn run() {
//! let config = ServerConfig::default();
//! let mut routes = RoutingTable::new();
//! routes.register_rest_route("/database", Method::Get, MatchMode::Exact, |_| {
//!     RestReply::json("[]")
//! });
//! let factory = SessionFactory::new(SessionContext::from_config(&config, Arc::new(routes)));
//! Listener::bind(config.bind_addr, factory).run().await;
//! # }
//! ```

/// Domain layer: configuration and route types (no I/O).
pub mod domain;

/// Application layer: routing, classification and broadcast.
pub mod application;

/// Infrastructure layer: listener, sessions, WebSocket and TLS.
pub mod infrastructure;
