//! The response value handlers return.
//!
//! A [`Response`] is a description of what to send: a status, a header set
//! and a deferred [`Body`]. Building one has no side effects; it is written
//! to the client only when the [`Resolver`](crate::adapter::Resolver)
//! consumes it.

use std::fmt;

use serde::Serialize;
use tokio::io::AsyncRead;

use super::body::{Body, ClosingRead, JsonEncode};
use super::{Headers, StatusCode};

/// A fully specified HTTP outcome, built with chained calls.
///
/// # Examples
///
/// ```
/// use rttpx::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::UNAUTHORIZED)
///     .with_headers([("Content-Type", "hello/world")])
///     .with_headers([("X-Chainable", "headers")])
///     .text("Unauthorized");
///
/// assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
/// assert_eq!(response.headers().get("content-type"), Some("hello/world"));
/// assert_eq!(response.headers().get("x-chainable"), Some("headers"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
}

impl Response {
    /// Creates a response with the given status, no headers and no body.
    ///
    /// The status is not validated.
    pub fn new(status: impl Into<StatusCode>) -> Self {
        Self {
            status: status.into(),
            headers: Headers::new(),
            body: Body::Empty,
        }
    }

    /// An empty `200 OK` response.
    pub fn no_content() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Sets a JSON body and `Content-Type: application/json`.
    ///
    /// `value` is serialized when the body is written, not here.
    #[must_use]
    pub fn json<T>(mut self, value: T) -> Self
    where
        T: Serialize + Send + 'static,
    {
        self.headers.set("Content-Type", "application/json");
        self.body = Body::Json(Box::new(value) as Box<dyn JsonEncode>);
        self
    }

    /// Sets a plain text body. No `Content-Type` is added.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = Body::Text(text.into());
        self
    }

    /// Streams `reader` as the body. The reader is dropped afterwards but
    /// never explicitly closed.
    ///
    /// Dropping still releases whatever the reader owns: a
    /// [`tokio::fs::File`] passed here ends up closed just as with
    /// [`closing_reader`](Self::closing_reader). To keep a source open, pass
    /// a reader that borrows or shares it instead of owning it.
    #[must_use]
    pub fn reader<R>(mut self, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.body = Body::Reader(Box::new(reader));
        self
    }

    /// Streams `reader` as the body and closes it once streaming ends,
    /// successfully or not.
    #[must_use]
    pub fn closing_reader<R>(mut self, reader: R) -> Self
    where
        R: ClosingRead + 'static,
    {
        self.body = Body::ClosingReader(Box::new(reader));
        self
    }

    /// Merges `headers` into the header set. Later values win on a name
    /// collision; earlier, unrelated headers are kept.
    #[must_use]
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.headers.set(name, value);
        }
        self
    }

    /// Sets a single header, replacing any previous value.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the header set.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the deferred body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Splits the response into its status, headers and body.
    pub fn into_parts(self) -> (StatusCode, Headers, Body) {
        (self.status, self.headers, self.body)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::no_content()
    }
}

impl fmt::Display for Response {
    /// Renders the status and, for text and JSON bodies, the body itself.
    /// Streamed bodies are shown as `<stream>` so they are never consumed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)?;
        match &self.body {
            Body::Empty => Ok(()),
            Body::Text(text) => write!(f, ": {text}"),
            Body::Json(value) => match value.encode() {
                Ok(bytes) => write!(f, ": {}", String::from_utf8_lossy(&bytes)),
                Err(e) => write!(f, ": <unencodable json: {e}>"),
            },
            Body::Reader(_) | Body::ClosingReader(_) => f.write_str(": <stream>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::http::BodyKind;

    #[test]
    fn new_has_no_headers_or_body() {
        let r = Response::new(StatusCode::CREATED);
        assert_eq!(r.status(), StatusCode::CREATED);
        assert!(r.headers().is_empty());
        assert!(r.body().is_empty());
    }

    #[test]
    fn accepts_any_status() {
        assert_eq!(Response::new(StatusCode::from_u16(799)).status().as_u16(), 799);
    }

    #[test]
    fn no_content_is_empty_ok() {
        let r = Response::no_content();
        assert_eq!(r.status(), StatusCode::OK);
        assert_eq!(r.body().kind(), BodyKind::Empty);
    }

    #[test]
    fn later_headers_override_earlier_ones() {
        let r = Response::new(StatusCode::OK)
            .with_headers(HashMap::from([("A", "1")]))
            .with_headers(HashMap::from([("A", "2"), ("B", "3")]));

        assert_eq!(r.headers().len(), 2);
        assert_eq!(r.headers().get("A"), Some("2"));
        assert_eq!(r.headers().get("B"), Some("3"));
    }

    #[test]
    fn json_sets_content_type() {
        let r = Response::new(StatusCode::OK).json(vec![1, 2, 3]);
        assert_eq!(r.headers().get("content-type"), Some("application/json"));
        assert_eq!(r.body().kind(), BodyKind::Json);
    }

    #[test]
    fn explicit_header_after_json_wins() {
        let r = Response::new(StatusCode::OK)
            .json("x")
            .header("content-type", "application/problem+json");
        assert_eq!(
            r.headers().get("Content-Type"),
            Some("application/problem+json")
        );
        assert_eq!(r.headers().len(), 1);
    }

    #[test]
    fn text_sets_no_content_type() {
        let r = Response::new(StatusCode::OK).text("hi");
        assert!(!r.headers().contains("content-type"));
        assert_eq!(r.body().kind(), BodyKind::Text);
    }

    #[test]
    fn last_body_wins() {
        let r = Response::new(StatusCode::OK).text("first").reader(&b"second"[..]);
        assert_eq!(r.body().kind(), BodyKind::Reader);
    }

    #[test]
    fn display_renders_inline_bodies() {
        assert_eq!(
            Response::new(StatusCode::BAD_REQUEST).text("nope").to_string(),
            "400 Bad Request: nope"
        );
        assert_eq!(
            Response::new(StatusCode::OK).json(serde_json::json!({"a": 1})).to_string(),
            r#"200 OK: {"a":1}"#
        );
        assert_eq!(
            Response::new(StatusCode::OK).reader(&b"x"[..]).to_string(),
            "200 OK: <stream>"
        );
        assert_eq!(Response::no_content().to_string(), "200 OK");
    }
}
