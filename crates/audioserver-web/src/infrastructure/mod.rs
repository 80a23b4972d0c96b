//! Infrastructure layer: everything that touches sockets, files and TLS.
//!
//! # Responsibilities
//!
//! - Binding the TCP listener and running the accept loop
//! - Terminating TLS when configured
//! - Driving each HTTP session through its state machine
//! - Performing the WebSocket upgrade and serialising writes per connection
//! - Pushing periodic state to WebSocket clients
//! - Loading the TOML configuration file
//!
//! Routing decisions and response bodies come from the application layer;
//! nothing here decides *what* to answer.

pub mod body_reader;
pub mod config_file;
pub mod error;
pub mod listener;
pub mod session;
pub mod state_push;
pub mod tls;
pub mod websocket;

pub use config_file::{load_config, ConfigError};
pub use error::{ServerError, SessionError, TlsError};
pub use listener::{ConnectionHandler, Listener};
pub use session::{Session, SessionContext, SessionFactory};
pub use state_push::spawn_periodic_broadcast;
pub use tls::load_tls_acceptor;
pub use websocket::WebsocketSession;
