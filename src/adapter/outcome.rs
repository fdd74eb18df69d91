//! What a result-returning handler hands back.

use std::fmt;

use thiserror::Error;

use super::ErrorCode;
use crate::http::Response;

/// A type-erased, thread-safe error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The return type of a result-returning handler.
///
/// `Ok(())` means the handler already wrote its response through the raw
/// writer. `Err` carries either a fully specified [`Response`] or an opaque
/// error for the classifier.
pub type HandlerResult = Result<(), HandlerError>;

/// The error side of [`HandlerResult`].
///
/// Any `std::error::Error` converts into [`HandlerError::Other`], so `?`
/// works on ordinary fallible calls. [`Response`] and [`ErrorCode`] convert
/// into [`HandlerError::Response`].
#[derive(Debug)]
pub enum HandlerError {
    /// An intentional outcome, written as-is.
    Response(Response),
    /// Anything else; mapped to a response by the classifier.
    Other(BoxError),
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

impl HandlerError {
    /// Wraps an arbitrary boxed error.
    pub fn other(error: impl Into<BoxError>) -> Self {
        Self::Other(error.into())
    }

    /// Creates an opaque error from a message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::Other(Box::new(Message(message.to_string())))
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Response(response) => write!(f, "{response}"),
            Self::Other(error) => write!(f, "{error}"),
        }
    }
}

impl From<Response> for HandlerError {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl From<ErrorCode> for HandlerError {
    fn from(code: ErrorCode) -> Self {
        Self::Response(code.json())
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::Other(Box::new(error))
    }
}

/// The three ways a handler invocation can end, as seen by the resolver.
#[derive(Debug)]
pub enum Outcome {
    /// The handler wrote its own response; nothing more to do.
    Handled,
    /// A response to write.
    Response(Response),
    /// An opaque error to classify.
    Error(BoxError),
}

impl From<HandlerResult> for Outcome {
    fn from(result: HandlerResult) -> Self {
        match result {
            Ok(()) => Self::Handled,
            Err(HandlerError::Response(response)) => Self::Response(response),
            Err(HandlerError::Other(error)) => Self::Error(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;

    fn parse_port(raw: &str) -> HandlerResult {
        let _port: u16 = raw.parse()?;
        Ok(())
    }

    #[test]
    fn question_mark_wraps_std_errors() {
        assert!(matches!(Outcome::from(parse_port("8080")), Outcome::Handled));
        match Outcome::from(parse_port("eighty")) {
            Outcome::Error(e) => assert_eq!(e.to_string(), "invalid digit found in string"),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn response_stays_a_response() {
        let result: HandlerResult = Err(Response::new(StatusCode::CONFLICT).into());
        match Outcome::from(result) {
            Outcome::Response(r) => assert_eq!(r.status(), StatusCode::CONFLICT),
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn error_code_becomes_json_response() {
        const GONE: ErrorCode = ErrorCode::new("GONE", StatusCode::GONE);
        match HandlerError::from(GONE) {
            HandlerError::Response(r) => {
                assert_eq!(r.status(), StatusCode::GONE);
                assert_eq!(r.headers().get("content-type"), Some("application/json"));
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn msg_displays_its_text() {
        assert_eq!(HandlerError::msg("plain text").to_string(), "plain text");
        assert_eq!(
            HandlerError::from(Response::new(StatusCode::BAD_REQUEST).text("x")).to_string(),
            "400 Bad Request: x"
        );
    }
}
