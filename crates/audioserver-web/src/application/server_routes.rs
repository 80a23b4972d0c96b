//! Routes the stand-alone binary installs on start-up.
//!
//! Collaborators that embed the front end register their own REST routes and
//! virtual resources next to these.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use audioserver_core::{Method, NameGenerator, UploadName};
use serde_json::json;
use tracing::info;

use crate::application::broadcast::ConnectionRegistry;
use crate::application::routing_table::RoutingTable;
use crate::domain::config::ServerConfig;
use crate::domain::routes::{MatchMode, RestReply};

/// Suffix given to every stored upload.
pub const UPLOAD_SUFFIX: &str = ".mp3";

/// Path of the JSON status route.
pub const STATUS_PATH: &str = "/status";

/// Installs the upload route and `GET /status`.
///
/// Each finished upload is announced to all WebSocket clients as
/// `{"event":"upload","id":"<uuid>"}`.
pub fn install_default_routes(routes: &mut RoutingTable, config: &ServerConfig) {
    let upload_dir: PathBuf = config.upload_dir.clone();
    let registry = Arc::clone(routes.websockets());
    routes.register_upload_route(
        &config.upload_path,
        move || NameGenerator::create(&upload_dir, UPLOAD_SUFFIX),
        move |name: &UploadName| announce_upload(&registry, name),
    );

    let registry = Arc::clone(routes.websockets());
    routes.register_rest_route(STATUS_PATH, Method::Get, MatchMode::Exact, move |_| {
        RestReply::json(
            json!({
                "server": audioserver_core::protocol::SERVER_NAME,
                "websocket_clients": registry.connection_count(),
            })
            .to_string(),
        )
    });
}

/// State document the binary pushes to WebSocket clients.
///
/// Embedders with a player supply their own provider instead.
pub fn state_snapshot(registry: &ConnectionRegistry, started: Instant) -> String {
    json!({
        "event": "state",
        "server": audioserver_core::protocol::SERVER_NAME,
        "uptime_secs": started.elapsed().as_secs(),
        "websocket_clients": registry.connection_count(),
    })
    .to_string()
}

fn announce_upload(registry: &ConnectionRegistry, name: &UploadName) -> bool {
    info!("new upload available: {}", name.file_name.display());
    let notice = json!({ "event": "upload", "id": name.unique_id }).to_string();
    let reached = registry.broadcast(&notice);
    info!("upload {} announced to {reached} websocket client(s)", name.unique_id);
    true
}
