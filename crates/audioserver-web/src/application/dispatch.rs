//! Request classification.
//!
//! Decides, from the request head alone, which branch of the session state
//! machine handles a request.  Validation runs first so a bad method or an
//! escaping target never reaches a route lookup or the filesystem.

use audioserver_core::{Method, RequestHead, Status};

use crate::application::routing_table::RoutingTable;
use crate::domain::routes::{NameFactory, RestHandler, RouteKind, UploadCompletion};

/// Body of the 400 sent for methods other than GET, HEAD and POST.
pub const UNKNOWN_METHOD: &str = "Unknown HTTP-method";

/// Body of the 400 sent for relative or traversing targets.
pub const ILLEGAL_TARGET: &str = "Illegal request-target";

/// Branch chosen for one request.
pub enum Dispatch {
    /// Answer immediately with an error.
    Reject { status: Status, reason: &'static str },
    /// Stream the body to a file from the name factory.
    Upload {
        name_factory: NameFactory,
        completion: UploadCompletion,
    },
    /// Buffer the body and call a REST handler.
    Rest(RestHandler),
    /// Hand the connection to a WebSocket session.
    WebsocketUpgrade,
    /// Serve from the document root.
    StaticFile,
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatch::Reject { status, reason } => f
                .debug_struct("Reject")
                .field("status", status)
                .field("reason", reason)
                .finish(),
            Dispatch::Upload { .. } => f.write_str("Upload"),
            Dispatch::Rest(_) => f.write_str("Rest"),
            Dispatch::WebsocketUpgrade => f.write_str("WebsocketUpgrade"),
            Dispatch::StaticFile => f.write_str("StaticFile"),
        }
    }
}

/// Checks method and target before any lookup.
///
/// Returns the rejection reason, or `None` when the request may proceed.
pub fn validate(head: &RequestHead) -> Option<&'static str> {
    if !matches!(head.method, Method::Get | Method::Head | Method::Post) {
        return Some(UNKNOWN_METHOD);
    }
    let target = head.target.as_str();
    if target.is_empty() || !target.starts_with('/') || target.contains("..") {
        return Some(ILLEGAL_TARGET);
    }
    None
}

/// Picks the branch for `head`.
///
/// Priority: upload route, REST route, WebSocket upgrade on
/// `websocket_path`, static file.
pub fn classify(head: &RequestHead, routes: &RoutingTable, websocket_path: &str) -> Dispatch {
    if let Some(reason) = validate(head) {
        return Dispatch::Reject {
            status: Status::BadRequest,
            reason,
        };
    }

    if let Some(route) = routes.lookup_upload(&head.target, &head.method) {
        if let RouteKind::Uploader {
            name_factory,
            completion,
        } = &route.kind
        {
            return Dispatch::Upload {
                name_factory: name_factory.clone(),
                completion: completion.clone(),
            };
        }
    }

    if let Some(route) = routes.lookup_rest(&head.target, &head.method) {
        if let RouteKind::Responder(handler) = &route.kind {
            return Dispatch::Rest(handler.clone());
        }
    }

    if head.is_websocket_upgrade() && head.path() == websocket_path {
        return Dispatch::WebsocketUpgrade;
    }

    Dispatch::StaticFile
}

// ── Tests ─────────────────────────────────────────────────────────────────────
