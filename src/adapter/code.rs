//! Named, reusable JSON error codes.

use std::fmt;

use serde::Serialize;
use serde::ser::{Error as _, SerializeMap, Serializer};

use crate::http::{Response, StatusCode};

/// A business error identity paired with the HTTP status it maps to.
///
/// Codes are plain values, usually declared once as `static`s and shared by
/// every request.
///
/// # Examples
///
/// ```
/// use rttpx::adapter::ErrorCode;
/// use rttpx::StatusCode;
///
/// static NOT_FOUND: ErrorCode = ErrorCode::new("NOT_FOUND", StatusCode::NOT_FOUND);
///
/// let response = NOT_FOUND.json();
/// assert_eq!(response.status(), StatusCode::NOT_FOUND);
/// assert_eq!(response.to_string(), r#"404 Not Found: {"code":"NOT_FOUND"}"#);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    code: &'static str,
    status: StatusCode,
}

impl ErrorCode {
    pub const fn new(code: &'static str, status: StatusCode) -> Self {
        Self { code, status }
    }

    pub const fn code(&self) -> &'static str {
        self.code
    }

    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Builds a response with this code's status and body `{"code": ...}`.
    pub fn json(&self) -> Response {
        Response::new(self.status).json(ErrorBody::<()> {
            code: self.code,
            extra: None,
        })
    }

    /// Like [`json`](Self::json) with an `"extra"` field carrying `extra`.
    ///
    /// If `extra` serializes to `null` the key is left out entirely.
    pub fn json_with<T>(&self, extra: T) -> Response
    where
        T: Serialize + Send + 'static,
    {
        Response::new(self.status).json(ErrorBody {
            code: self.code,
            extra: Some(extra),
        })
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code, self.status)
    }
}

struct ErrorBody<T> {
    code: &'static str,
    extra: Option<T>,
}

impl<T: Serialize> Serialize for ErrorBody<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = match &self.extra {
            Some(value) => serde_json::to_value(value).map_err(S::Error::custom)?,
            None => serde_json::Value::Null,
        };

        let len = if extra.is_null() { 1 } else { 2 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("code", self.code)?;
        if !extra.is_null() {
            map.serialize_entry("extra", &extra)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::http::{BodyError, BodyKind};

    static NOT_FOUND: ErrorCode = ErrorCode::new("NOT_FOUND", StatusCode::NOT_FOUND);
    static BAD: ErrorCode = ErrorCode::new("BAD", StatusCode::BAD_REQUEST);

    async fn body_of(response: Response) -> String {
        let (_, _, body) = response.into_parts();
        let mut out = Vec::new();
        body.copy_to(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn bare_code_has_no_extra_key() {
        let response = NOT_FOUND.json();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(response).await, r#"{"code":"NOT_FOUND"}"#);
    }

    #[tokio::test]
    async fn extra_is_included() {
        let response = BAD.json_with("details");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_of(response).await, r#"{"code":"BAD","extra":"details"}"#);
    }

    #[tokio::test]
    async fn structured_extra() {
        let extra = serde_json::json!({ "field": "email", "reason": "taken" });
        assert_eq!(
            body_of(BAD.json_with(extra)).await,
            r#"{"code":"BAD","extra":{"field":"email","reason":"taken"}}"#
        );
    }

    #[tokio::test]
    async fn null_extra_is_omitted() {
        assert_eq!(body_of(BAD.json_with(None::<String>)).await, r#"{"code":"BAD"}"#);
        assert_eq!(body_of(BAD.json_with(())).await, r#"{"code":"BAD"}"#);
    }

    #[tokio::test]
    async fn unencodable_extra_fails_at_copy_time() {
        let mut extra = HashMap::new();
        extra.insert(vec![0u8], "value");

        let response = BAD.json_with(extra);
        assert_eq!(response.body().kind(), BodyKind::Json);

        let (_, _, body) = response.into_parts();
        let mut out = Vec::new();
        assert!(matches!(
            body.copy_to(&mut out).await,
            Err(BodyError::Json(_))
        ));
    }

    #[test]
    fn display_names_code_and_status() {
        assert_eq!(NOT_FOUND.to_string(), "NOT_FOUND (404 Not Found)");
        assert_eq!(NOT_FOUND.code(), "NOT_FOUND");
        assert_eq!(NOT_FOUND.status(), StatusCode::NOT_FOUND);
    }
}
