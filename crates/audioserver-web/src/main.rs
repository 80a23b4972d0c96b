//! audioserver front end: entry point.
//!
//! Serves the web UI from the document root, stores MP3 uploads posted to
//! `/upload` and keeps a WebSocket open at `/dynamic` for state pushes.
//!
//! # Usage
//!
//! ```text
//! audioserver [OPTIONS]
//!
//! Options:
//!   --config <FILE>          TOML configuration file
//!   --bind-address <IP>      Listener address [default: 0.0.0.0]
//!   --port <PORT>            Listener port [default: 8080]
//!   --base-path <DIR>        Installation root [default: /var/audioserver]
//!   --document-root <DIR>    Static files [default: <base-path>/html]
//!   --upload-dir <DIR>       Stored uploads [default: <base-path>/mp3]
//!   --state-push-ms <MS>     WebSocket state push period, 0 disables [default: 500]
//!   --tls-cert <FILE>        PEM certificate chain (enables TLS)
//!   --tls-key <FILE>         PEM private key
//!   --log-level <FILTER>     Used when RUST_LOG is unset [default: info]
//! ```
//!
//! Precedence, lowest first: built-in defaults, the config file, environment
//! variables, command-line flags.
//!
//! | Variable                    | Flag              |
//! |-----------------------------|-------------------|
//! | `AUDIOSERVER_CONFIG`        | `--config`        |
//! | `AUDIOSERVER_BIND`          | `--bind-address`  |
//! | `AUDIOSERVER_PORT`          | `--port`          |
//! | `AUDIOSERVER_BASE_PATH`     | `--base-path`     |
//! | `AUDIOSERVER_DOCUMENT_ROOT` | `--document-root` |
//! | `AUDIOSERVER_UPLOAD_DIR`    | `--upload-dir`    |
//! | `AUDIOSERVER_STATE_PUSH_MS` | `--state-push-ms` |
//! | `AUDIOSERVER_TLS_CERT`      | `--tls-cert`      |
//! | `AUDIOSERVER_TLS_KEY`       | `--tls-key`       |
//! | `AUDIOSERVER_LOG`           | `--log-level`     |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use audioserver_web::application::{install_default_routes, state_snapshot, RoutingTable};
use audioserver_web::domain::{ServerConfig, TlsSettings};
use audioserver_web::infrastructure::config_file::state_push_interval;
use audioserver_web::infrastructure::{
    load_config, load_tls_acceptor, spawn_periodic_broadcast, Listener, SessionContext,
    SessionFactory,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Audio server network front end.
#[derive(Debug, Default, Parser)]
#[command(
    name = "audioserver",
    about = "HTTP/WebSocket front end for the audio server",
    version
)]
struct Cli {
    /// TOML configuration file.  Flags override its values.
    #[arg(long, env = "AUDIOSERVER_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind the listener to.
    #[arg(long, env = "AUDIOSERVER_BIND")]
    bind_address: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "AUDIOSERVER_PORT")]
    port: Option<u16>,

    /// Installation root; resets the document root and upload directory to
    /// `<base-path>/html` and `<base-path>/mp3`.
    #[arg(long, env = "AUDIOSERVER_BASE_PATH")]
    base_path: Option<PathBuf>,

    #[arg(long, env = "AUDIOSERVER_DOCUMENT_ROOT")]
    document_root: Option<PathBuf>,

    #[arg(long, env = "AUDIOSERVER_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Milliseconds between WebSocket state pushes; 0 disables them.
    #[arg(long, env = "AUDIOSERVER_STATE_PUSH_MS")]
    state_push_ms: Option<u64>,

    /// PEM certificate chain.  Requires `--tls-key`.
    #[arg(long, env = "AUDIOSERVER_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// PEM private key.  Requires `--tls-cert`.
    #[arg(long, env = "AUDIOSERVER_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// `tracing` filter used when `RUST_LOG` is unset.
    #[arg(long, env = "AUDIOSERVER_LOG")]
    log_level: Option<String>,
}

impl Cli {
    /// Resolves defaults, the optional config file and the flags into a
    /// [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or
    /// `--bind-address` is not an IP address.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(base_path) = self.base_path {
            let rebased = ServerConfig::with_base_path(base_path);
            config.base_path = rebased.base_path;
            config.document_root = rebased.document_root;
            config.upload_dir = rebased.upload_dir;
        }
        if let Some(root) = self.document_root {
            config.document_root = root;
        }
        if let Some(dir) = self.upload_dir {
            config.upload_dir = dir;
        }
        if let Some(millis) = self.state_push_ms {
            config.state_push_interval = state_push_interval(millis);
        }

        let ip: IpAddr = match &self.bind_address {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid bind address: '{raw}'"))?,
            None => config.bind_addr.ip(),
        };
        let port = self.port.unwrap_or(config.bind_addr.port());
        config.bind_addr = SocketAddr::new(ip, port);

        if let (Some(cert_path), Some(key_path)) = (self.tls_cert, self.tls_key) {
            config.tls = Some(TlsSettings {
                cert_path,
                key_path,
            });
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_server_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "audioserver starting: bind={}, document_root={}, upload_dir={}, tls={}",
        config.bind_addr,
        config.document_root.display(),
        config.upload_dir.display(),
        config.tls.is_some()
    );

    std::fs::create_dir_all(&config.upload_dir).with_context(|| {
        format!(
            "failed to create upload directory {}",
            config.upload_dir.display()
        )
    })?;

    let mut routes = RoutingTable::new();
    install_default_routes(&mut routes, &config);

    let registry = Arc::clone(routes.websockets());

    let mut factory = SessionFactory::new(SessionContext::from_config(&config, Arc::new(routes)));
    if let Some(tls) = &config.tls {
        let acceptor = load_tls_acceptor(tls).context("failed to set up TLS")?;
        factory = factory.with_tls(acceptor);
    }

    let listener = Listener::bind(config.bind_addr, factory);
    if !listener.is_open() {
        anyhow::bail!("could not open listener on {}", config.bind_addr);
    }

    let started = Instant::now();
    let state_push = config.state_push_interval.map(|period| {
        let source = Arc::clone(&registry);
        spawn_periodic_broadcast(registry, period, move || {
            Some(state_snapshot(&source, started))
        })
    });

    tokio::select! {
        () = listener.run() => info!("listener stopped"),
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("received Ctrl+C; shutting down"),
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        },
    }

    if let Some(task) = state_push {
        task.abort();
    }
    info!("audioserver stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
