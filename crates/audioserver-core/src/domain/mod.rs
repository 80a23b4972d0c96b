//! Domain types shared by the server crate: upload naming and session ids.
//!
//! Nothing here touches the network or the filesystem.

/// Destination naming for uploaded files.
pub mod names;

/// Monotonic identifiers used to tag each session in the logs.
pub mod run_id;
