//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for runtime settings.  It is
//! a plain struct with no environment or file reads of its own; `main.rs`
//! layers the config file and command-line flags on top of the defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default installation root on the appliance.
pub const DEFAULT_BASE_PATH: &str = "/var/audioserver";

/// Path on which browsers open the player-state WebSocket.
pub const DEFAULT_WEBSOCKET_PATH: &str = "/dynamic";

/// Path that accepts MP3 uploads.
pub const DEFAULT_UPLOAD_PATH: &str = "/upload";

/// How often player state is pushed to WebSocket clients.
pub const DEFAULT_STATE_PUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Size caps applied while reading a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum bytes of request line plus headers.
    pub max_header_bytes: usize,
    /// Maximum body size buffered for a REST handler.  Uploads are streamed
    /// to disk and are not subject to this cap.
    pub max_rest_body_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_rest_body_bytes: 1024 * 1024,
        }
    }
}

/// PEM files for TLS termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// All runtime configuration for the front end.
///
/// # Example
///
/// ```rust
/// use audioserver_web::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8080);
/// assert!(cfg.upload_dir.ends_with("mp3"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: SocketAddr,
    /// Installation root; the document root and upload dir live below it
    /// unless set explicitly.
    pub base_path: PathBuf,
    /// Root of the static file tree.
    pub document_root: PathBuf,
    /// Directory that receives uploaded files.
    pub upload_dir: PathBuf,
    pub upload_path: String,
    pub websocket_path: String,
    pub limits: Limits,
    /// Period of the state push over WebSocket; `None` disables it.
    pub state_push_interval: Option<Duration>,
    /// TLS is enabled when present.
    pub tls: Option<TlsSettings>,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl ServerConfig {
    /// Defaults rooted at `base_path`.
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            document_root: base_path.join("html"),
            upload_dir: base_path.join("mp3"),
            base_path,
            upload_path: DEFAULT_UPLOAD_PATH.to_string(),
            websocket_path: DEFAULT_WEBSOCKET_PATH.to_string(),
            limits: Limits::default(),
            state_push_interval: Some(DEFAULT_STATE_PUSH_INTERVAL),
            tls: None,
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    /// | Field          | Default                  |
    /// |----------------|--------------------------|
    /// | bind_addr      | `0.0.0.0:8080`           |
    /// | document_root  | `/var/audioserver/html`  |
    /// | upload_dir     | `/var/audioserver/mp3`   |
    /// | upload_path    | `/upload`                |
    /// | websocket_path | `/dynamic`               |
    /// | state push     | every 500 ms             |
    fn default() -> Self {
        Self::with_base_path(DEFAULT_BASE_PATH)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
