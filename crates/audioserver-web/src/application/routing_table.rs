//! Path/method dispatch table.
//!
//! Populated once at startup, then shared read-only by every session through
//! an `Arc`.  The only part that changes at runtime is the embedded
//! [`ConnectionRegistry`], which carries its own lock.

use std::collections::HashMap;
use std::sync::Arc;

use audioserver_core::{protocol::strip_query, Method, Request, UploadName};
use tracing::{debug, warn};

use crate::application::broadcast::ConnectionRegistry;
use crate::domain::routes::{
    MatchMode, NameFactory, RestHandler, RestReply, Route, RouteKind, UploadCompletion,
    VirtualResourceHandler, VirtualResourceKind,
};

/// Registered REST and upload routes, virtual resource handlers and live
/// WebSocket connections.
#[derive(Default)]
pub struct RoutingTable {
    rest: Vec<Route>,
    uploads: Vec<Route>,
    virtual_resources: HashMap<VirtualResourceKind, VirtualResourceHandler>,
    websockets: Arc<ConnectionRegistry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Appends a REST route.
    ///
    /// Registering the same path, method and mode twice keeps both entries;
    /// only the earlier one is ever selected.
    pub fn register_rest_route<F>(&mut self, path: &str, method: Method, mode: MatchMode, handler: F)
    where
        F: Fn(&Request) -> RestReply + Send + Sync + 'static,
    {
        self.register_rest_handler(path, method, mode, Arc::new(handler));
    }

    /// [`register_rest_route`](Self::register_rest_route) for an already
    /// shared handler.
    pub fn register_rest_handler(
        &mut self,
        path: &str,
        method: Method,
        mode: MatchMode,
        handler: RestHandler,
    ) {
        if self.rest.iter().any(|r| r.same_key(path, &method, mode)) {
            warn!("REST route {method} {path} ({mode:?}) already registered; new entry is shadowed");
        }
        debug!("REST route registered: {method} {path} ({mode:?})");
        self.rest.push(Route {
            pattern: path.to_string(),
            method,
            mode,
            kind: RouteKind::Responder(handler),
        });
    }

    /// Registers an upload route for `POST path` (exact match).
    ///
    /// An existing upload route at the same path is replaced in place.
    pub fn register_upload_route<N, C>(&mut self, path: &str, name_factory: N, completion: C)
    where
        N: Fn() -> UploadName + Send + Sync + 'static,
        C: Fn(&UploadName) -> bool + Send + Sync + 'static,
    {
        let name_factory: NameFactory = Arc::new(name_factory);
        let completion: UploadCompletion = Arc::new(completion);
        let route = Route {
            pattern: path.to_string(),
            method: Method::Post,
            mode: MatchMode::Exact,
            kind: RouteKind::Uploader {
                name_factory,
                completion,
            },
        };

        match self
            .uploads
            .iter_mut()
            .find(|r| r.same_key(path, &Method::Post, MatchMode::Exact))
        {
            Some(existing) => {
                warn!("upload route POST {path} replaced");
                *existing = route;
            }
            None => {
                debug!("upload route registered: POST {path}");
                self.uploads.push(route);
            }
        }
    }

    /// Installs the handler for one kind of synthetic resource, replacing any
    /// previous one.
    pub fn register_virtual_resource_handler<F>(&mut self, kind: VirtualResourceKind, handler: F)
    where
        F: Fn(&str) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        if self
            .virtual_resources
            .insert(kind, Arc::new(handler))
            .is_some()
        {
            warn!("virtual resource handler for {kind:?} replaced");
        }
    }

    // ── Lookup ────────────────────────────────────────────────────────────────

    /// First REST route serving `target` for `method`.  The query string is
    /// ignored.
    pub fn lookup_rest(&self, target: &str, method: &Method) -> Option<&Route> {
        lookup(&self.rest, target, method)
    }

    /// Upload route serving `target` for `method`, if any.
    pub fn lookup_upload(&self, target: &str, method: &Method) -> Option<&Route> {
        lookup(&self.uploads, target, method)
    }

    /// Content for a synthetic path, if a handler for its kind is registered
    /// and recognises it.
    pub fn resolve_virtual_resource(&self, target: &str) -> Option<Vec<u8>> {
        let path = strip_query(target);
        let kind = VirtualResourceKind::for_path(path)?;
        let handler = self.virtual_resources.get(&kind)?;
        handler(path)
    }

    pub fn has_virtual_resource_handler(&self, kind: VirtualResourceKind) -> bool {
        self.virtual_resources.contains_key(&kind)
    }

    // ── WebSocket registry ────────────────────────────────────────────────────

    /// Shared handle to the connection registry, for sessions and for
    /// collaborators that push state to browsers.
    pub fn websockets(&self) -> &Arc<ConnectionRegistry> {
        &self.websockets
    }

    /// Queues `message` on every live WebSocket connection.
    pub fn broadcast(&self, message: &str) -> usize {
        self.websockets.broadcast(message)
    }
}

fn lookup<'a>(routes: &'a [Route], target: &str, method: &Method) -> Option<&'a Route> {
    let path = strip_query(target);
    routes.iter().find(|r| r.matches(path, method))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
