//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a [`Handler`].
//! Supports HTTP/1.1 persistent connections (keep-alive) out of the box.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::http::{
    ResponseWriter, Sink, StatusCode,
    request::{Request, RequestError},
};
use crate::router::Handler;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The rttpx HTTP server.
///
/// Binds to a TCP address and dispatches incoming HTTP/1.1 requests to a
/// [`Handler`], usually a [`Router`](crate::Router).
///
/// # Examples
///
/// ```rust,no_run
/// use rttpx::adapter::{HandlerResult, Resolver};
/// use rttpx::{Request, Response, Router, Server, StatusCode};
///
/// async fn hello(_req: Request) -> HandlerResult {
///     Err(Response::new(StatusCode::OK).text("Hello!").into())
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let resolver = Resolver::default();
///     let mut router = Router::new();
///     router.get("/", resolver.handler(|req, _writer| Box::pin(hello(req))));
///
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(router).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting connections and dispatching requests to `handler`.
    ///
    /// The handler is wrapped in an [`Arc`] and shared across all spawned
    /// Tokio tasks. It writes each response through the [`ResponseWriter`]
    /// it is given; whatever it leaves unwritten is completed here (an empty
    /// `200 OK` if it wrote nothing at all).
    ///
    /// This method runs until the process is terminated or an unrecoverable
    /// listener error occurs.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H: Handler>(self, handler: H) -> Result<(), ServerError> {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "rttpx listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, serving one
/// request per iteration, until the peer closes the connection or either
/// side asks for `Connection: close`.
async fn handle_connection<H: Handler>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error> {
    let (mut reader, write_half) = stream.into_split();
    let mut sink: Sink = Box::new(write_half);
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let Some((request, body_offset, total)) =
            read_request(&mut reader, &mut buf, &mut sink, peer_addr).await?
        else {
            break;
        };

        let frame = buf.split_to(total).freeze();
        let request = request.with_body(frame.slice(body_offset..));
        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let mut writer = ResponseWriter::new(sink, keep_alive);
        handler.call(Context::new(request), &mut writer).await;
        if !writer.is_committed() {
            debug!(peer = %peer_addr, "handler wrote nothing; sending empty 200");
        }
        writer.finish().await?;

        let keep_alive = writer.keep_alive();
        sink = writer.into_sink();

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close — shutting down");
            break;
        }
    }

    Ok(())
}

/// Reads from `reader` until `buf` holds a complete request.
///
/// Returns the parsed head, the body offset and the total frame length, or
/// `None` once the connection should close (peer hung up or the request was
/// rejected).
async fn read_request(
    reader: &mut OwnedReadHalf,
    buf: &mut BytesMut,
    sink: &mut Sink,
    peer_addr: SocketAddr,
) -> Result<Option<(Request, usize, usize)>, std::io::Error> {
    loop {
        // Leftover bytes from a pipelined request may already be complete.
        if !buf.is_empty() {
            match Request::parse(&buf[..]) {
                Ok((request, body_offset)) => {
                    let content_length = request.content_length().unwrap_or(0);
                    let Some(total) = body_offset
                        .checked_add(content_length)
                        .filter(|total| *total <= MAX_REQUEST_SIZE)
                    else {
                        warn!(
                            peer = %peer_addr,
                            content_length,
                            "request too large — sending 413"
                        );
                        reject(sink, StatusCode::PAYLOAD_TOO_LARGE, "Request entity too large")
                            .await?;
                        return Ok(None);
                    };
                    if buf.len() >= total {
                        return Ok(Some((request, body_offset, total)));
                    }
                }
                Err(RequestError::Incomplete) => {}
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                    reject(sink, StatusCode::BAD_REQUEST, &format!("Bad Request: {e}")).await?;
                    return Ok(None);
                }
            }
        }

        // Guard against excessively large request heads.
        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large — sending 413");
            reject(sink, StatusCode::PAYLOAD_TOO_LARGE, "Request entity too large").await?;
            return Ok(None);
        }

        let bytes_read = reader.read_buf(buf).await?;
        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            return Ok(None);
        }
    }
}

/// Writes a plain-text error response that closes the connection.
async fn reject(sink: &mut Sink, status: StatusCode, message: &str) -> std::io::Result<()> {
    let taken = std::mem::replace(sink, Box::new(tokio::io::sink()));
    let mut writer = ResponseWriter::new(taken, false);
    writer.set_header("Content-Type", "text/plain");
    writer.set_header("Content-Length", message.len().to_string());
    writer.write_head(status);
    writer.write_all(message.as_bytes()).await?;
    writer.finish().await?;
    *sink = writer.into_sink();
    Ok(())
}
