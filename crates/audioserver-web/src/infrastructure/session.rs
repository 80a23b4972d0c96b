//! HTTP session: one request, one response, then close.
//!
//! # State machine
//!
//! ```text
//! Accepted ─▶ ReadingHead ─┬─▶ UploadBody ──▶ Responding ─▶ Closed
//!                          ├─▶ RestBody ────▶ Responding ─▶ Closed
//!                          ├─▶ StaticFile ──▶ Responding ─▶ Closed
//!                          ├─▶ Rejected ────▶ Responding ─▶ Closed
//!                          └─▶ Upgrading ───▶ WebsocketSession
//! ```
//!
//! Every `await` is a suspension point at which the session owns its buffer,
//! request state and open file, so nothing is shared with other sessions
//! except the read-only [`SessionContext`].
//!
//! A transport or framing error that happens before a response could be
//! formed closes the connection without answering; everything else is
//! answered with one of the fixed responses below.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use audioserver_core::protocol::find_head_end;
use audioserver_core::{
    BodyDecoder, Method, Request, RequestHead, Response, ResponseHead, RunIdCounter, Status,
};
use bytes::BytesMut;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::application::dispatch::{classify, Dispatch};
use crate::application::routing_table::RoutingTable;
use crate::application::static_files::{content_type_for, resolve_path};
use crate::domain::config::{Limits, ServerConfig};
use crate::domain::routes::{NameFactory, RestHandler, UploadCompletion};
use crate::infrastructure::body_reader::{BodyReader, READ_CHUNK};
use crate::infrastructure::error::SessionError;
use crate::infrastructure::listener::ConnectionHandler;
use crate::infrastructure::websocket::WebsocketSession;

/// Body of the 400 sent for an unparseable head or body framing.
pub const BAD_REQUEST: &str = "Bad request";

/// Body of the 413 sent when a buffered body exceeds the limit.
pub const PAYLOAD_TOO_LARGE: &str = "Payload too large";

/// Body of the 500 sent when an upload target cannot be created.
pub const UPLOAD_OPEN_FAILED: &str = "An error occurred: 'open file failed for writing'";

/// Content type of the empty upload acknowledgement.
pub const UPLOAD_CONTENT_TYPE: &str = "audio/mp3";

/// Read-only state shared by every session.
pub struct SessionContext {
    pub routes: Arc<RoutingTable>,
    pub document_root: PathBuf,
    pub websocket_path: String,
    pub limits: Limits,
}

impl SessionContext {
    pub fn from_config(config: &ServerConfig, routes: Arc<RoutingTable>) -> Self {
        Self {
            routes,
            document_root: config.document_root.clone(),
            websocket_path: config.websocket_path.clone(),
            limits: config.limits,
        }
    }
}

/// What happens to the connection after the request is handled.
enum Next {
    Close,
    Upgrade(RequestHead),
}

/// One accepted connection in its HTTP phase.
pub struct Session<S> {
    stream: S,
    peer: SocketAddr,
    buf: BytesMut,
    ctx: Arc<SessionContext>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, peer: SocketAddr, ctx: Arc<SessionContext>) -> Self {
        Self {
            stream,
            peer,
            buf: BytesMut::with_capacity(READ_CHUNK),
            ctx,
        }
    }

    /// Serves the connection to completion.  Errors are logged here and
    /// never propagate to the listener.
    pub async fn run(mut self) {
        match self.serve().await {
            Ok(Next::Upgrade(head)) => return self.upgrade(head).await,
            Ok(Next::Close) => {}
            Err(SessionError::UnexpectedEof) => debug!("peer closed mid-request"),
            Err(e) => warn!("session error: {e}"),
        }
        // Shutdown failures are irrelevant once the exchange is over.
        let _ = self.stream.shutdown().await;
    }

    async fn upgrade(self, head: RequestHead) {
        let Self {
            stream,
            peer,
            buf,
            ctx,
        } = self;
        let registry = Arc::clone(ctx.routes.websockets());
        match WebsocketSession::accept(stream, buf.to_vec(), peer, &head, registry).await {
            Ok(session) => session.run().await,
            Err(e) => warn!("websocket handshake failed: {e}"),
        }
    }

    async fn serve(&mut self) -> Result<Next, SessionError> {
        let head = match self.read_head().await {
            Ok(Some(head)) => head,
            Ok(None) => {
                debug!("connection closed before a request");
                return Ok(Next::Close);
            }
            Err(SessionError::Protocol(e)) => {
                debug!("malformed request head: {e}");
                self.send(&Response::message(Status::BadRequest, BAD_REQUEST).encode())
                    .await?;
                return Ok(Next::Close);
            }
            Err(e) => return Err(e),
        };
        debug!("{} {}", head.method, head.target);

        let dispatch = match classify(&head, &self.ctx.routes, &self.ctx.websocket_path) {
            Dispatch::Reject { status, reason } => {
                info!("rejected {} {}: {reason}", head.method, head.target);
                self.respond(&head, Response::message(status, reason)).await?;
                return Ok(Next::Close);
            }
            Dispatch::WebsocketUpgrade => return self.check_upgrade(head).await,
            other => other,
        };

        let decoder = match BodyDecoder::for_head(&head) {
            Ok(decoder) => decoder,
            Err(e) => {
                debug!("bad body framing: {e}");
                self.respond(&head, Response::message(Status::BadRequest, BAD_REQUEST))
                    .await?;
                return Ok(Next::Close);
            }
        };

        match dispatch {
            Dispatch::Upload {
                name_factory,
                completion,
            } => self.upload(&head, decoder, name_factory, completion).await?,
            Dispatch::Rest(handler) => self.rest(head, decoder, handler).await?,
            _ => self.static_file(&head, decoder).await?,
        }
        Ok(Next::Close)
    }

    // ── Reading ───────────────────────────────────────────────────────────────

    /// Reads up to and including the blank line that ends the head.  Bytes
    /// past it stay in `buf` for the body reader or the WebSocket.
    ///
    /// `Ok(None)` means the peer closed before sending anything.
    async fn read_head(&mut self) -> Result<Option<RequestHead>, SessionError> {
        let limit = self.ctx.limits.max_header_bytes;
        loop {
            if let Some(end) = find_head_end(&self.buf) {
                if end > limit {
                    return Err(SessionError::HeadTooLarge { limit });
                }
                let raw = self.buf.split_to(end);
                return Ok(Some(RequestHead::parse(&raw)?));
            }
            if self.buf.len() > limit {
                return Err(SessionError::HeadTooLarge { limit });
            }
            self.buf.reserve(READ_CHUNK);
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(SessionError::UnexpectedEof)
                };
            }
        }
    }

    // ── Branches ──────────────────────────────────────────────────────────────

    async fn check_upgrade(&mut self, head: RequestHead) -> Result<Next, SessionError> {
        let has_key = head
            .header("sec-websocket-key")
            .is_some_and(|key| !key.trim().is_empty());
        let version_13 = head
            .header("sec-websocket-version")
            .is_some_and(|v| v.trim() == "13");
        if has_key && version_13 {
            return Ok(Next::Upgrade(head));
        }
        debug!("incomplete websocket handshake");
        self.respond(&head, Response::message(Status::BadRequest, BAD_REQUEST))
            .await?;
        Ok(Next::Close)
    }

    /// Streams the body into a freshly named file, then runs the completion
    /// callback.  A body that ends early leaves the partial file behind and
    /// gets no response.
    async fn upload(
        &mut self,
        head: &RequestHead,
        decoder: BodyDecoder,
        name_factory: NameFactory,
        completion: UploadCompletion,
    ) -> Result<(), SessionError> {
        let name = name_factory();
        let mut file = match File::create(&name.file_name).await {
            Ok(file) => file,
            Err(e) => {
                error!("cannot create {}: {e}", name.file_name.display());
                return self
                    .respond(
                        head,
                        Response::message(Status::InternalServerError, UPLOAD_OPEN_FAILED),
                    )
                    .await;
            }
        };

        let mut written = 0u64;
        let mut body = BodyReader::new(&mut self.stream, &mut self.buf, decoder);
        loop {
            let chunk = match body.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    warn!("upload {} aborted after {written} bytes: {e}", name.unique_id);
                    return Err(e);
                }
            };
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);
        info!(
            "stored upload {} ({written} bytes) as {}",
            name.unique_id,
            name.file_name.display()
        );

        if !completion(&name) {
            warn!("upload completion reported failure for {}", name.unique_id);
        }
        self.respond(head, Response::new(Status::Ok, UPLOAD_CONTENT_TYPE, Vec::new()))
            .await
    }

    async fn rest(
        &mut self,
        head: RequestHead,
        decoder: BodyDecoder,
        handler: RestHandler,
    ) -> Result<(), SessionError> {
        let limit = self.ctx.limits.max_rest_body_bytes;
        let read = BodyReader::new(&mut self.stream, &mut self.buf, decoder)
            .read_to_end(limit)
            .await;
        let body = match read {
            Ok(body) => body,
            Err(SessionError::BodyTooLarge { limit }) => {
                warn!("REST body for {} exceeds {limit} bytes", head.target);
                return self
                    .respond(&head, Response::message(Status::PayloadTooLarge, PAYLOAD_TOO_LARGE))
                    .await;
            }
            Err(e) => return Err(e),
        };

        let request = Request::new(head, String::from_utf8_lossy(&body).into_owned());
        let reply = handler(&request);
        let response = if reply.is_empty() {
            Response::message(Status::NotFound, request.target())
        } else {
            Response::new(Status::Ok, reply.content_type, reply.body)
        };
        self.respond(&request.head, response).await
    }

    async fn static_file(
        &mut self,
        head: &RequestHead,
        decoder: BodyDecoder,
    ) -> Result<(), SessionError> {
        // Any body is read and dropped so the response is not sent mid-upload.
        let limit = self.ctx.limits.max_rest_body_bytes;
        let discarded = BodyReader::new(&mut self.stream, &mut self.buf, decoder)
            .read_to_end(limit)
            .await;
        match discarded {
            Ok(_) => {}
            Err(SessionError::BodyTooLarge { .. }) => {
                return self
                    .respond(head, Response::message(Status::PayloadTooLarge, PAYLOAD_TOO_LARGE))
                    .await;
            }
            Err(e) => return Err(e),
        }

        let path = resolve_path(&self.ctx.document_root, &head.target);
        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return self.not_found(head).await,
            Err(e) => {
                warn!("cannot open {}: {e}", path.display());
                return self
                    .respond(head, Response::message(Status::InternalServerError, e.to_string()))
                    .await;
            }
        };
        let metadata = file.metadata().await?;
        if metadata.is_dir() {
            return self.not_found(head).await;
        }

        let response_head = ResponseHead::new(Status::Ok)
            .version(head.version)
            .keep_alive(head.keep_alive())
            .content_type(content_type_for(&path))
            .content_length(metadata.len());
        self.stream.write_all(&response_head.encode()).await?;
        if head.method != Method::Head {
            tokio::io::copy(&mut file, &mut self.stream).await?;
        }
        self.stream.flush().await?;
        debug!("served {} ({} bytes)", path.display(), metadata.len());
        Ok(())
    }

    /// 404 unless a virtual resource handler produces content for a GET.
    async fn not_found(&mut self, head: &RequestHead) -> Result<(), SessionError> {
        if head.method == Method::Get {
            if let Some(data) = self.ctx.routes.resolve_virtual_resource(&head.target) {
                let content_type = content_type_for(Path::new(head.path()));
                return self
                    .respond(head, Response::new(Status::Ok, content_type, data))
                    .await;
            }
        }
        self.respond(head, Response::message(Status::NotFound, head.target.as_str()))
            .await
    }

    // ── Writing ───────────────────────────────────────────────────────────────

    /// Sends `response` with the request's version and keep-alive flag.  A
    /// HEAD request gets the head only.
    async fn respond(&mut self, request: &RequestHead, response: Response) -> Result<(), SessionError> {
        let response = response
            .version(request.version)
            .keep_alive(request.keep_alive());
        debug!(status = response.head.status.code(), "responding");
        if request.method == Method::Head {
            self.send(&response.head.encode()).await
        } else {
            self.send(&response.encode()).await
        }
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

// ── Session factory ───────────────────────────────────────────────────────────

/// Spawns one [`Session`] task per accepted connection, optionally behind a
/// TLS handshake.
pub struct SessionFactory {
    ctx: Arc<SessionContext>,
    tls: Option<TlsAcceptor>,
    ids: RunIdCounter,
}

impl SessionFactory {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            tls: None,
            ids: RunIdCounter::new(),
        }
    }

    /// Terminates TLS on every connection before the HTTP session starts.
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }
}

impl ConnectionHandler for SessionFactory {
    fn handle(&self, stream: TcpStream, peer: SocketAddr) {
        let id = self.ids.next();
        let ctx = Arc::clone(&self.ctx);
        let tls = self.tls.clone();
        let span = info_span!("session", id, %peer);

        tokio::spawn(
            async move {
                match tls {
                    None => Session::new(stream, peer, ctx).run().await,
                    Some(acceptor) => {
                        // Handshake failures (scanners, plain HTTP) are not logged.
                        if let Ok(stream) = acceptor.accept(stream).await {
                            Session::new(stream, peer, ctx).run().await;
                        }
                    }
                }
            }
            .instrument(span),
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
