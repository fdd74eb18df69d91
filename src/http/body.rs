//! Deferred response bodies.
//!
//! A [`Body`] describes how to produce the bytes of a response without
//! producing them yet. Nothing is encoded or read until
//! [`Body::copy_to`] runs, which happens once, after the status line is
//! committed.

use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Errors raised while copying a body into the output sink.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("I/O error while writing body: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to close body source: {0}")]
    Close(#[source] io::Error),
}

/// A body source that must be released explicitly once streaming ends.
///
/// [`Body::ClosingReader`] calls [`close`](Self::close) after the copy,
/// whether it succeeded or failed.
pub trait Close {
    /// Releases the source. Consumes it, so it cannot be read afterwards.
    fn close(self: Box<Self>) -> io::Result<()>;
}

impl Close for tokio::fs::File {
    fn close(self: Box<Self>) -> io::Result<()> {
        drop(self);
        Ok(())
    }
}

/// A readable source that is closed after streaming.
pub trait ClosingRead: AsyncRead + Close + Send + Unpin {}

impl<T> ClosingRead for T where T: AsyncRead + Close + Send + Unpin {}

/// A value that can be encoded as a JSON document on demand.
pub trait JsonEncode: Send {
    fn encode(&self) -> serde_json::Result<Vec<u8>>;
}

impl<T> JsonEncode for T
where
    T: Serialize + Send,
{
    fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// The deferred body of a [`Response`](super::Response).
#[derive(Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// A value serialized as JSON when copied.
    Json(Box<dyn JsonEncode>),
    /// Raw text.
    Text(String),
    /// A stream copied to the end. The source is dropped, never closed.
    Reader(Box<dyn AsyncRead + Send + Unpin>),
    /// A stream copied to the end and then closed on every exit path.
    ClosingReader(Box<dyn ClosingRead>),
}

/// The variant of a [`Body`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Empty,
    Json,
    Text,
    Reader,
    ClosingReader,
}

impl fmt::Display for BodyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty",
            Self::Json => "json",
            Self::Text => "text",
            Self::Reader => "reader",
            Self::ClosingReader => "closing-reader",
        })
    }
}

impl Body {
    /// Returns the variant of this body.
    pub fn kind(&self) -> BodyKind {
        match self {
            Self::Empty => BodyKind::Empty,
            Self::Json(_) => BodyKind::Json,
            Self::Text(_) => BodyKind::Text,
            Self::Reader(_) => BodyKind::Reader,
            Self::ClosingReader(_) => BodyKind::ClosingReader,
        }
    }

    /// Returns `true` for [`Body::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Writes the body into `sink`, returning the number of bytes written.
    ///
    /// JSON encoding happens here, so encoding failures surface as
    /// [`BodyError::Json`]. The sink is not flushed.
    ///
    /// # Errors
    ///
    /// Returns [`BodyError`] if encoding, reading, writing or closing fails.
    /// For [`Body::ClosingReader`] a copy error takes precedence over a close
    /// error; the source is closed either way.
    pub async fn copy_to<W>(self, sink: &mut W) -> Result<u64, BodyError>
    where
        W: AsyncWrite + Send + Unpin + ?Sized,
    {
        match self {
            Self::Empty => Ok(0),
            Self::Json(value) => {
                let encoded = value.encode()?;
                sink.write_all(&encoded).await?;
                Ok(encoded.len() as u64)
            }
            Self::Text(text) => {
                sink.write_all(text.as_bytes()).await?;
                Ok(text.len() as u64)
            }
            Self::Reader(mut reader) => Ok(tokio::io::copy(&mut reader, sink).await?),
            Self::ClosingReader(mut reader) => {
                let copied = tokio::io::copy(&mut reader, sink).await;
                let closed = reader.close();
                match (copied, closed) {
                    (Err(e), _) => Err(BodyError::Io(e)),
                    (Ok(_), Err(e)) => Err(BodyError::Close(e)),
                    (Ok(n), Ok(())) => Ok(n),
                }
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            other => write!(f, "{:?}", other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::task::{Context, Poll};

    use tokio::io::ReadBuf;

    use super::*;

    /// Reader over a static slice that records when it is closed and can be
    /// told to fail instead of producing data.
    struct Tracked {
        data: &'static [u8],
        fail: bool,
        closed: Arc<AtomicBool>,
    }

    impl AsyncRead for Tracked {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.fail {
                return Poll::Ready(Err(io::Error::other("source broke")));
            }
            Pin::new(&mut self.data).poll_read(cx, buf)
        }
    }

    impl Close for Tracked {
        fn close(self: Box<Self>) -> io::Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn tracked(data: &'static [u8], fail: bool) -> (Body, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let body = Body::ClosingReader(Box::new(Tracked {
            data,
            fail,
            closed: Arc::clone(&closed),
        }));
        (body, closed)
    }

    #[tokio::test]
    async fn empty_writes_nothing() {
        let mut out = Vec::new();
        assert_eq!(Body::Empty.copy_to(&mut out).await.unwrap(), 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn json_is_encoded_at_copy_time() {
        let mut out = Vec::new();
        let body = Body::Json(Box::new(serde_json::json!({ "hello": "world" })));
        let n = body.copy_to(&mut out).await.unwrap();
        assert_eq!(out, br#"{"hello":"world"}"#);
        assert_eq!(n, out.len() as u64);
    }

    #[tokio::test]
    async fn json_encoding_failure_surfaces_from_copy() {
        let mut bad = HashMap::new();
        bad.insert(vec![1u8], 1);

        let mut out = Vec::new();
        let err = Body::Json(Box::new(bad)).copy_to(&mut out).await.unwrap_err();
        assert!(matches!(err, BodyError::Json(_)));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn reader_streams_everything() {
        let mut out = Vec::new();
        let body = Body::Reader(Box::new(&b"streamed bytes"[..]));
        assert_eq!(body.copy_to(&mut out).await.unwrap(), 14);
        assert_eq!(out, b"streamed bytes");
    }

    #[tokio::test]
    async fn reader_source_is_dropped_after_copy() {
        struct Dropped(Arc<AtomicBool>);

        impl Drop for Dropped {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        impl AsyncRead for Dropped {
            fn poll_read(
                self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
                _buf: &mut ReadBuf<'_>,
            ) -> Poll<io::Result<()>> {
                Poll::Ready(Ok(()))
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let body = Body::Reader(Box::new(Dropped(Arc::clone(&dropped))));
        let mut out = Vec::new();
        assert_eq!(body.copy_to(&mut out).await.unwrap(), 0);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn closing_reader_closes_after_success() {
        let (body, closed) = tracked(b"file contents", false);
        let mut out = Vec::new();
        body.copy_to(&mut out).await.unwrap();
        assert_eq!(out, b"file contents");
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn closing_reader_closes_after_failure() {
        let (body, closed) = tracked(b"", true);
        let mut out = Vec::new();
        let err = body.copy_to(&mut out).await.unwrap_err();
        assert!(matches!(err, BodyError::Io(_)));
        assert!(closed.load(Ordering::SeqCst));
    }

    /// A sink that refuses every write.
    struct Broken;

    impl AsyncWrite for Broken {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn closing_reader_closes_when_sink_fails() {
        let (body, closed) = tracked(b"never delivered", false);
        let err = body.copy_to(&mut Broken).await.unwrap_err();
        match err {
            BodyError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected Io, got {other:?}"),
        }
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Body::Text("x".into()).kind(), BodyKind::Text);
        assert_eq!(Body::default().kind(), BodyKind::Empty);
        assert_eq!(BodyKind::ClosingReader.to_string(), "closing-reader");
    }
}
