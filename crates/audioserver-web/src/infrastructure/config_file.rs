//! TOML configuration file.
//!
//! Every field is optional; anything missing falls back to the
//! [`ServerConfig`] defaults.  Example:
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 8080
//! base_path = "/var/audioserver"
//! log_level = "info"
//! state_push_ms = 500   # 0 disables the push
//!
//! [limits]
//! max_rest_body_bytes = 1048576
//!
//! [tls]
//! cert_path = "/etc/audioserver/cert.pem"
//! key_path = "/etc/audioserver/key.pem"
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::config::{
    Limits, ServerConfig, TlsSettings, DEFAULT_BASE_PATH, DEFAULT_STATE_PUSH_INTERVAL,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_address` is not an IP address.
    #[error("invalid bind address: {0:?}")]
    InvalidBindAddress(String),
}

// ── File schema ───────────────────────────────────────────────────────────────

/// Top-level file layout.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub limits: LimitsSection,
    pub tls: Option<TlsSection>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    /// Defaults to `<base_path>/html`.
    pub document_root: Option<PathBuf>,
    /// Defaults to `<base_path>/mp3`.
    pub upload_dir: Option<PathBuf>,
    pub upload_path: Option<String>,
    pub websocket_path: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Milliseconds between state pushes; `0` disables them.
    #[serde(default = "default_state_push_ms")]
    pub state_push_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LimitsSection {
    pub max_header_bytes: Option<usize>,
    pub max_rest_body_bytes: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TlsSection {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_base_path() -> PathBuf {
    PathBuf::from(DEFAULT_BASE_PATH)
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_state_push_ms() -> u64 {
    DEFAULT_STATE_PUSH_INTERVAL.as_millis() as u64
}

/// Maps a millisecond period to an interval, `0` meaning disabled.
pub fn state_push_interval(millis: u64) -> Option<Duration> {
    (millis > 0).then(|| Duration::from_millis(millis))
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            base_path: default_base_path(),
            document_root: None,
            upload_dir: None,
            upload_path: None,
            websocket_path: None,
            log_level: default_log_level(),
            state_push_ms: default_state_push_ms(),
        }
    }
}

impl FileConfig {
    /// Resolves the file into a complete [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] if `bind_address` does not
    /// parse as an IP address.
    pub fn into_server_config(self) -> Result<ServerConfig, ConfigError> {
        let server = self.server;
        let ip: IpAddr = server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(server.bind_address.clone()))?;

        let mut config = ServerConfig::with_base_path(server.base_path);
        config.bind_addr = SocketAddr::new(ip, server.port);
        if let Some(root) = server.document_root {
            config.document_root = root;
        }
        if let Some(dir) = server.upload_dir {
            config.upload_dir = dir;
        }
        if let Some(path) = server.upload_path {
            config.upload_path = path;
        }
        if let Some(path) = server.websocket_path {
            config.websocket_path = path;
        }
        config.log_level = server.log_level;
        config.state_push_interval = state_push_interval(server.state_push_ms);

        let defaults = Limits::default();
        config.limits = Limits {
            max_header_bytes: self
                .limits
                .max_header_bytes
                .unwrap_or(defaults.max_header_bytes),
            max_rest_body_bytes: self
                .limits
                .max_rest_body_bytes
                .unwrap_or(defaults.max_rest_body_bytes),
        };
        config.tls = self.tls.map(|tls| TlsSettings {
            cert_path: tls.cert_path,
            key_path: tls.key_path,
        });
        Ok(config)
    }
}

/// Parses configuration from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed or has unknown
/// keys.
pub fn parse_config(content: &str) -> Result<FileConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Loads and resolves the configuration file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read, plus any error
/// from [`parse_config`] or [`FileConfig::into_server_config`].
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)?.into_server_config()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
