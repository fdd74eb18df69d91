//! The raw response sink handed to every native handler.
//!
//! [`ResponseWriter`] buffers headers until the status line is committed,
//! picks the body framing at that moment, and then behaves as an
//! [`AsyncWrite`] for the body. The status line is written at most once.

use std::borrow::Cow;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

use super::headers::{clean_value, is_valid_name};
use super::{Headers, StatusCode};

/// The underlying byte sink, usually the write half of a TCP connection.
pub type Sink = Box<dyn AsyncWrite + Send + Unpin>;

/// How the body is delimited on the wire, decided when the head is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// Status forbids a body (1xx, 204, 304).
    Bodyless,
    /// The handler supplied `Content-Length`.
    Sized,
    /// `Transfer-Encoding: chunked`, used when the connection stays open.
    Chunked,
    /// Body runs until the connection closes.
    UntilClose,
}

/// Writes one HTTP/1.1 response into a [`Sink`].
///
/// Headers set before [`write_head`](Self::write_head) are sent with the
/// status line; changing them afterwards has no effect on the wire. Writing
/// body bytes before an explicit `write_head` commits an implicit `200 OK`.
///
/// # Examples
///
/// ```
/// use rttpx::http::{ResponseWriter, StatusCode};
/// use tokio::io::AsyncWriteExt;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> std::io::Result<()> {
/// let mut writer = ResponseWriter::new(Box::new(tokio::io::sink()), false);
/// writer.set_header("Content-Type", "text/plain");
/// writer.write_head(StatusCode::ACCEPTED);
/// writer.write_all(b"queued").await?;
/// writer.finish().await?;
///
/// assert_eq!(writer.status(), Some(StatusCode::ACCEPTED));
/// assert_eq!(writer.bytes_written(), 6);
/// # Ok(())
/// # }
/// ```
pub struct ResponseWriter {
    sink: Sink,
    headers: Headers,
    status: Option<StatusCode>,
    framing: Framing,
    keep_alive: bool,
    // Bytes accepted from the caller but not yet handed to the sink.
    pending: BytesMut,
    written: u64,
    finished: bool,
}

impl ResponseWriter {
    /// Wraps `sink`. `keep_alive` is what the request asked for; the writer
    /// may still downgrade it to `close` if the body cannot be delimited.
    pub fn new(sink: Sink, keep_alive: bool) -> Self {
        Self {
            sink,
            headers: Headers::new(),
            status: None,
            framing: Framing::UntilClose,
            keep_alive,
            pending: BytesMut::new(),
            written: 0,
            finished: false,
        }
    }

    /// Returns the pending response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the pending response headers for modification.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Sets a response header, replacing earlier values for the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Returns the committed status, or `None` if the head is not written yet.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Returns `true` once the status line has been committed.
    pub fn is_committed(&self) -> bool {
        self.status.is_some()
    }

    /// Returns the number of body bytes accepted so far (framing excluded).
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Returns `true` if the connection can carry another request after
    /// this response. Only final once [`finish`](Self::finish) has run.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Commits the status line and headers.
    ///
    /// Only the first call has an effect; later calls are logged and ignored.
    /// The head is buffered and reaches the sink with the first body write or
    /// flush.
    pub fn write_head(&mut self, status: StatusCode) {
        if let Some(committed) = self.status {
            warn!(
                committed = committed.as_u16(),
                ignored = status.as_u16(),
                "superfluous write_head call"
            );
            return;
        }

        if self
            .headers
            .get("connection")
            .is_some_and(|value| value.eq_ignore_ascii_case("close"))
        {
            self.keep_alive = false;
        }

        self.framing = if !status.allows_body() {
            Framing::Bodyless
        } else if self.headers.contains("content-length") {
            Framing::Sized
        } else if self.keep_alive {
            Framing::Chunked
        } else {
            Framing::UntilClose
        };

        match self.framing {
            Framing::Chunked => self.headers.set("Transfer-Encoding", "chunked"),
            Framing::UntilClose => self.keep_alive = false,
            Framing::Bodyless | Framing::Sized => {}
        }
        self.headers.set(
            "Connection",
            if self.keep_alive { "keep-alive" } else { "close" },
        );

        let estimated_size = 32 + self.headers.len() * 64;
        self.pending.reserve(estimated_size);
        self.pending.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            if !is_valid_name(name) {
                warn!(header = ?name, "dropping header with invalid name");
                continue;
            }
            let value = clean_value(value);
            if let Cow::Owned(_) = value {
                warn!(header = name, "replaced line breaks in header value");
            }
            self.pending.put(name.as_bytes());
            self.pending.put(&b": "[..]);
            self.pending.put(value.as_bytes());
            self.pending.put(&b"\r\n"[..]);
        }
        self.pending.put(&b"\r\n"[..]);

        self.status = Some(status);
    }

    /// Completes the response: commits an implicit `200 OK` if nothing was
    /// written, terminates a chunked body and flushes everything to the sink.
    ///
    /// Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the sink.
    pub async fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        if self.status.is_none() {
            self.write_head(StatusCode::OK);
        }

        match self.framing {
            Framing::Chunked => self.pending.put(&b"0\r\n\r\n"[..]),
            Framing::Sized => {
                let declared = self
                    .headers
                    .get("content-length")
                    .and_then(|value| value.trim().parse::<u64>().ok());
                if declared != Some(self.written) {
                    warn!(
                        declared = ?declared,
                        written = self.written,
                        "body length does not match Content-Length; closing connection"
                    );
                    self.keep_alive = false;
                }
            }
            Framing::Bodyless | Framing::UntilClose => {}
        }

        self.finished = true;
        self.flush().await
    }

    /// Returns the underlying sink, for reuse on a persistent connection.
    pub fn into_sink(self) -> Sink {
        self.sink
    }

    // Hands every pending byte to the sink.
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.pending.is_empty() {
            let n = ready!(Pin::new(&mut self.sink).poll_write(cx, &self.pending))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.pending.advance(n);
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ResponseWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(Err(io::Error::other("response already finished")));
        }
        if this.status.is_none() {
            this.write_head(StatusCode::OK);
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        match this.framing {
            Framing::Bodyless => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "response status does not allow a body",
            ))),
            Framing::Chunked => {
                ready!(this.poll_drain(cx))?;
                this.pending.put(format!("{:x}\r\n", buf.len()).as_bytes());
                this.pending.put_slice(buf);
                this.pending.put(&b"\r\n"[..]);
                this.written += buf.len() as u64;
                Poll::Ready(Ok(buf.len()))
            }
            Framing::Sized | Framing::UntilClose => {
                ready!(this.poll_drain(cx))?;
                let n = ready!(Pin::new(&mut this.sink).poll_write(cx, buf))?;
                this.written += n as u64;
                Poll::Ready(Ok(n))
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.sink).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.sink).poll_shutdown(cx)
    }
}
