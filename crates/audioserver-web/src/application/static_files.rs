//! Static file path resolution and content types.
//!
//! Targets reaching this module have already passed
//! [`validate`](crate::application::dispatch::validate), so they are absolute
//! and free of `..`.  The path is used as-is (no percent-decoding), which
//! keeps an encoded `%2e%2e` from turning into a traversal here.

use std::path::{Path, PathBuf};

use audioserver_core::protocol::strip_query;

/// File served for a target ending in `/`.
pub const INDEX_FILE: &str = "index.html";

/// Maps a request target to a file below `root`.
pub fn resolve_path(root: &Path, target: &str) -> PathBuf {
    let path = strip_query(target);
    let relative = path.trim_start_matches('/');
    let mut resolved = root.join(relative);
    if path.ends_with('/') {
        resolved.push(INDEX_FILE);
    }
    resolved
}

/// Content type from the file extension; unknown extensions are served as
/// `application/octet-stream`.
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_maps_to_index() {
        let root = Path::new("/srv");
        assert_eq!(resolve_path(root, "/"), PathBuf::from("/srv/index.html"));
    }

    #[test]
    fn test_directory_target_maps_to_index() {
        let root = Path::new("/srv");
        assert_eq!(
            resolve_path(root, "/docs/?lang=en"),
            PathBuf::from("/srv/docs/index.html")
        );
    }

    #[test]
    fn test_query_is_stripped() {
        let root = Path::new("/srv");
        assert_eq!(
            resolve_path(root, "/js/app.js?v=3"),
            PathBuf::from("/srv/js/app.js")
        );
    }

    #[test]
    fn test_path_never_escapes_root() {
        let root = Path::new("/srv");
        let resolved = resolve_path(root, "//etc/passwd");
        assert!(resolved.starts_with(root));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a/index.html")), "text/html");
        assert_eq!(content_type_for(Path::new("song.mp3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("cover.png")), "image/png");
        assert_eq!(
            content_type_for(Path::new("blob.unknownext")),
            "application/octet-stream"
        );
    }
}
