//! Route and handler types.
//!
//! A route binds `(path pattern, method, match mode)` to one of two handler
//! shapes:
//!
//! - a **responder** turns a fully read request into a [`RestReply`];
//! - an **uploader** names a destination file before the body arrives and is
//!   told once the body is on disk.
//!
//! The collaborators behind these closures (player, database, playlists) live
//! outside this crate.

use std::fmt;
use std::sync::Arc;

use audioserver_core::{Method, Request, UploadName};

/// Content type for JSON replies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// How a registered pattern is compared with the query-stripped path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchMode {
    /// Full string equality.
    Exact,
    /// The path starts with the pattern.
    Prefix,
}

impl MatchMode {
    pub fn matches(self, pattern: &str, path: &str) -> bool {
        match self {
            MatchMode::Exact => path == pattern,
            MatchMode::Prefix => path.starts_with(pattern),
        }
    }
}

/// Body and content type returned by a responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestReply {
    pub body: String,
    pub content_type: String,
}

impl RestReply {
    pub fn new(body: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: content_type.into(),
        }
    }

    pub fn json(body: impl Into<String>) -> Self {
        Self::new(body, JSON_CONTENT_TYPE)
    }

    /// Serialises `value` as a JSON reply.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if `value` cannot be serialised.
    pub fn json_value<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_string(value).map(Self::json)
    }

    /// A reply the session turns into 404.
    pub fn empty() -> Self {
        Self::new(String::new(), JSON_CONTENT_TYPE)
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Synchronous REST handler.
pub type RestHandler = Arc<dyn Fn(&Request) -> RestReply + Send + Sync>;

/// Produces the destination of the next upload.
pub type NameFactory = Arc<dyn Fn() -> UploadName + Send + Sync>;

/// Called once an upload is completely on disk.  The result is logged only.
pub type UploadCompletion = Arc<dyn Fn(&UploadName) -> bool + Send + Sync>;

/// Resolves a synthetic path (query stripped) to its content.
pub type VirtualResourceHandler = Arc<dyn Fn(&str) -> Option<Vec<u8>> + Send + Sync>;

/// What a route does once matched.
#[derive(Clone)]
pub enum RouteKind {
    Responder(RestHandler),
    Uploader {
        name_factory: NameFactory,
        completion: UploadCompletion,
    },
}

impl fmt::Debug for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteKind::Responder(_) => f.write_str("Responder"),
            RouteKind::Uploader { .. } => f.write_str("Uploader"),
        }
    }
}

/// One registration in the routing table.
#[derive(Debug, Clone)]
pub struct Route {
    pub pattern: String,
    pub method: Method,
    pub mode: MatchMode,
    pub kind: RouteKind,
}

impl Route {
    /// Whether this route serves `path` (already query-stripped) for `method`.
    pub fn matches(&self, path: &str, method: &Method) -> bool {
        self.method == *method && self.mode.matches(&self.pattern, path)
    }

    /// Same pattern, method and mode.
    pub fn same_key(&self, pattern: &str, method: &Method, mode: MatchMode) -> bool {
        self.pattern == pattern && self.method == *method && self.mode == mode
    }
}

/// Families of synthetic URLs served by collaborators rather than the file
/// tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualResourceKind {
    /// Cover art, `/img/...`.
    Image,
    /// Track audio by id, `/audio/...`.
    Audio,
    /// Rendered playlist, `/playlist/...`.
    Playlist,
}

impl VirtualResourceKind {
    pub const ALL: [VirtualResourceKind; 3] = [
        VirtualResourceKind::Image,
        VirtualResourceKind::Audio,
        VirtualResourceKind::Playlist,
    ];

    /// URL prefix owned by this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            VirtualResourceKind::Image => "/img/",
            VirtualResourceKind::Audio => "/audio/",
            VirtualResourceKind::Playlist => "/playlist/",
        }
    }

    /// Kind owning `path`, if any.
    pub fn for_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| path.starts_with(k.prefix()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn responder() -> RouteKind {
        RouteKind::Responder(Arc::new(|_| RestReply::json("[]")))
    }

    #[test]
    fn test_exact_mode_requires_equality() {
        assert!(MatchMode::Exact.matches("/database", "/database"));
        assert!(!MatchMode::Exact.matches("/database", "/database/x"));
        assert!(!MatchMode::Exact.matches("/database", "/data"));
    }

    #[test]
    fn test_prefix_mode_requires_starts_with() {
        assert!(MatchMode::Prefix.matches("/player", "/player"));
        assert!(MatchMode::Prefix.matches("/player", "/player/next"));
        assert!(!MatchMode::Prefix.matches("/player", "/play"));
    }

    #[test]
    fn test_route_matches_checks_method() {
        // Arrange
        let route = Route {
            pattern: "/database".to_string(),
            method: Method::Get,
            mode: MatchMode::Exact,
            kind: responder(),
        };

        // Assert
        assert!(route.matches("/database", &Method::Get));
        assert!(!route.matches("/database", &Method::Post));
    }

    #[test]
    fn test_empty_reply() {
        assert!(RestReply::empty().is_empty());
        assert!(!RestReply::json("[]").is_empty());
    }

    #[test]
    fn test_json_value_reply() {
        let reply = RestReply::json_value(&serde_json::json!({"ok": true})).unwrap();
        assert_eq!(reply.body, r#"{"ok":true}"#);
        assert_eq!(reply.content_type, JSON_CONTENT_TYPE);
    }

    #[test]
    fn test_virtual_resource_kind_for_path() {
        assert_eq!(
            VirtualResourceKind::for_path("/img/cover-12.jpg"),
            Some(VirtualResourceKind::Image)
        );
        assert_eq!(
            VirtualResourceKind::for_path("/audio/abc"),
            Some(VirtualResourceKind::Audio)
        );
        assert_eq!(
            VirtualResourceKind::for_path("/playlist/p1.m3u"),
            Some(VirtualResourceKind::Playlist)
        );
        assert_eq!(VirtualResourceKind::for_path("/index.html"), None);
        assert_eq!(VirtualResourceKind::for_path("/img"), None);
    }

    #[test]
    fn test_route_kind_debug_hides_closures() {
        assert_eq!(format!("{:?}", responder()), "Responder");
    }
}
