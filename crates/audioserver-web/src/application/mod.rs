//! Application layer: routing, request classification and the broadcast
//! registry.
//!
//! Depends on the domain layer and `audioserver-core`.  The only runtime
//! dependency is the channel type behind [`broadcast::Outbox`].
//! [`server_routes`] wires the routes the stand-alone binary installs.

pub mod broadcast;
pub mod dispatch;
pub mod routing_table;
pub mod server_routes;
pub mod static_files;

pub use broadcast::{ConnectionHandle, ConnectionRegistry, Outbox};
pub use dispatch::{classify, Dispatch};
pub use routing_table::RoutingTable;
pub use server_routes::{install_default_routes, state_snapshot};
