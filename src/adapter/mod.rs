//! Result-returning handlers.
//!
//! Native [`Handler`]s write their response through a [`ResponseWriter`] and
//! return nothing. This module lets a handler *return* its outcome instead:
//!
//! - `Ok(())` means the handler already wrote everything itself.
//! - `Err(HandlerError::Response(..))` is an intentional outcome, written
//!   as-is. [`ErrorCode`]s and plain [`Response`]s convert into it.
//! - `Err(HandlerError::Other(..))` is anything else. The configured
//!   classifier maps it to a response (by default `400` with the message).
//!
//! A [`Resolver`] owns the configuration and wraps functions into handlers
//! with [`Resolver::handler`] and [`Resolver::routed`].
//!
//! ```rust
//! use rttpx::adapter::{ErrorCode, HandlerResult, Resolver};
//! use rttpx::{Request, Response, Router, StatusCode};
//!
//! static MISSING_NAME: ErrorCode = ErrorCode::new("MISSING_NAME", StatusCode::BAD_REQUEST);
//!
//! async fn greet(req: Request) -> HandlerResult {
//!     let name = req.query_param("name").ok_or(MISSING_NAME)?;
//!     Err(Response::new(StatusCode::OK).text(format!("hello {name}")).into())
//! }
//!
//! let resolver = Resolver::default();
//! let mut router = Router::new();
//! router.get("/greet", resolver.handler(|req, _writer| Box::pin(greet(req))));
//! ```

mod code;
mod outcome;

use std::fmt;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub use code::ErrorCode;
pub use outcome::{BoxError, HandlerError, HandlerResult, Outcome};

use crate::context::{Context, Parameters};
use crate::http::{Body, BodyError, BodyKind, Headers, Request, Response, ResponseWriter, StatusCode};
use crate::router::{BoxFuture, Handler};

/// Maps an opaque handler error to the response sent for it.
pub type Classifier = Arc<dyn Fn(&BoxError) -> Response + Send + Sync>;

/// Notified when a response body fails to copy.
pub type CopyErrorObserver = Arc<dyn Fn(&BodyError) + Send + Sync>;

/// Runs once after every resolved response.
pub type AfterHook = Arc<dyn Fn(&ResponseWriter, &Request, &Resolution) + Send + Sync>;

/// Behaviour shared by every handler a [`Resolver`] wraps.
#[derive(Clone)]
pub struct ResolverConfig {
    classify: Classifier,
    on_copy_error: CopyErrorObserver,
    after: Option<AfterHook>,
}

fn bad_request(error: &BoxError) -> Response {
    Response::new(StatusCode::BAD_REQUEST).text(error.to_string())
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            classify: Arc::new(bad_request),
            on_copy_error: Arc::new(|_: &BodyError| {}),
            after: None,
        }
    }
}

impl ResolverConfig {
    /// Replaces the classifier for opaque errors.
    #[must_use]
    pub fn classify_with<F>(mut self, classify: F) -> Self
    where
        F: Fn(&BoxError) -> Response + Send + Sync + 'static,
    {
        self.classify = Arc::new(classify);
        self
    }

    /// Sets the observer for body copy failures. The failure is never retried.
    #[must_use]
    pub fn on_copy_error<F>(mut self, observe: F) -> Self
    where
        F: Fn(&BodyError) + Send + Sync + 'static,
    {
        self.on_copy_error = Arc::new(observe);
        self
    }

    /// Sets a hook that runs after each response this resolver writes.
    ///
    /// It does not run when the handler returned `Ok(())`.
    #[must_use]
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ResponseWriter, &Request, &Resolution) + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverConfig")
            .field("after", &self.after.is_some())
            .finish_non_exhaustive()
    }
}

/// Where the written response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The handler returned it.
    Handler,
    /// The classifier produced it from an opaque error.
    Classifier,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Handler => "handler",
            Self::Classifier => "classifier",
        })
    }
}

/// What happened to the body.
#[derive(Debug)]
pub enum Delivery {
    NoBody,
    /// Copied and flushed; number of bytes.
    Written(u64),
    /// The copy failed part way; the status line was already sent.
    Failed(BodyError),
}

/// A record of one resolved response, passed to the after-hook.
#[derive(Debug)]
pub struct Resolution {
    pub status: StatusCode,
    pub headers: Headers,
    pub source: Source,
    pub body: BodyKind,
    pub delivery: Delivery,
}

/// Wraps result-returning functions into native handlers.
///
/// Cheap to clone; every clone shares the same [`ResolverConfig`].
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: Arc<ResolverConfig>,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Adapts `f` into a [`Handler`].
    pub fn handler<F>(&self, f: F) -> Adapted<F>
    where
        F: for<'a> Fn(Request, &'a mut ResponseWriter) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        Adapted {
            resolver: self.clone(),
            f,
        }
    }

    /// Adapts `f`, which also receives the route's path parameters.
    pub fn routed<F>(&self, f: F) -> Routed<F>
    where
        F: for<'a> Fn(Request, Parameters, &'a mut ResponseWriter) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        Routed {
            resolver: self.clone(),
            f,
        }
    }

    /// Writes `result` into `writer`.
    ///
    /// Returns `None` when the result is `Ok(())`; nothing is written then.
    /// Body copy failures do not surface as errors: they are reported to the
    /// observer and recorded in [`Resolution::delivery`].
    pub async fn resolve(
        &self,
        result: HandlerResult,
        writer: &mut ResponseWriter,
        request: &Request,
    ) -> Option<Resolution> {
        self.resolve_inner(result, writer, Some(request)).await
    }

    // The request is only needed by the after-hook, so callers skip cloning
    // it when none is set.
    fn snapshot(&self, request: &Request) -> Option<Request> {
        self.config.after.is_some().then(|| request.clone())
    }

    async fn resolve_inner(
        &self,
        result: HandlerResult,
        writer: &mut ResponseWriter,
        request: Option<&Request>,
    ) -> Option<Resolution> {
        let (response, source) = match Outcome::from(result) {
            Outcome::Handled => {
                debug!(committed = writer.is_committed(), "handler wrote its own response");
                return None;
            }
            Outcome::Response(response) => (response, Source::Handler),
            Outcome::Error(error) => {
                debug!(error = %error, "classifying handler error");
                ((self.config.classify)(&error), Source::Classifier)
            }
        };

        let (status, headers, body) = response.into_parts();
        for (name, value) in headers.iter() {
            writer.set_header(name, value);
        }
        writer.write_head(status);

        let kind = body.kind();
        let delivery = if body.is_empty() {
            Delivery::NoBody
        } else {
            match deliver(body, writer).await {
                Ok(written) => Delivery::Written(written),
                Err(error) => {
                    warn!(
                        status = status.as_u16(),
                        body = %kind,
                        error = %error,
                        "failed to write response body"
                    );
                    (self.config.on_copy_error)(&error);
                    Delivery::Failed(error)
                }
            }
        };

        let resolution = Resolution {
            status,
            headers,
            source,
            body: kind,
            delivery,
        };
        if let (Some(after), Some(request)) = (&self.config.after, request) {
            after(writer, request, &resolution);
        }
        Some(resolution)
    }
}

async fn deliver(body: Body, writer: &mut ResponseWriter) -> Result<u64, BodyError> {
    let written = body.copy_to(writer).await?;
    writer.flush().await?;
    Ok(written)
}

/// A plain result-returning function adapted into a [`Handler`].
pub struct Adapted<F> {
    resolver: Resolver,
    f: F,
}

impl<F> Handler for Adapted<F>
where
    F: for<'a> Fn(Request, &'a mut ResponseWriter) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(&'a self, ctx: Context, writer: &'a mut ResponseWriter) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let request = ctx.into_request();
            let snapshot = self.resolver.snapshot(&request);
            let result = (self.f)(request, &mut *writer).await;
            self.resolver
                .resolve_inner(result, writer, snapshot.as_ref())
                .await;
        })
    }
}

/// A routed result-returning function adapted into a [`Handler`].
pub struct Routed<F> {
    resolver: Resolver,
    f: F,
}

impl<F> Handler for Routed<F>
where
    F: for<'a> Fn(Request, Parameters, &'a mut ResponseWriter) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(&'a self, ctx: Context, writer: &'a mut ResponseWriter) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let (request, params) = ctx.into_parts();
            let snapshot = self.resolver.snapshot(&request);
            let result = (self.f)(request, params, &mut *writer).await;
            self.resolver
                .resolve_inner(result, writer, snapshot.as_ref())
                .await;
        })
    }
}

/// An after-hook that logs one line per resolved request:
///
/// ```text
/// METHOD /path - STATUS (duration)
/// ```
///
/// Install it with [`ResolverConfig::after`].
pub fn log_resolution(writer: &ResponseWriter, request: &Request, resolution: &Resolution) {
    let elapsed = request.received_at().elapsed();
    match &resolution.delivery {
        Delivery::Failed(error) => warn!(
            source = %resolution.source,
            bytes = writer.bytes_written(),
            error = %error,
            "{} {} - {} ({:?}) body incomplete",
            request.method(),
            request.path(),
            resolution.status,
            elapsed
        ),
        Delivery::NoBody | Delivery::Written(_) => info!(
            source = %resolution.source,
            bytes = writer.bytes_written(),
            "{} {} - {} ({:?})",
            request.method(),
            request.path(),
            resolution.status,
            elapsed
        ),
    }
}
