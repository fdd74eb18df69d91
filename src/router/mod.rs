//! Request routing and the native handler shape.
//!
//! A native [`Handler`] receives a [`Context`] and the raw [`ResponseWriter`]
//! and returns nothing: it is responsible for writing the response itself.
//! [`Resolver`](crate::adapter::Resolver) turns result-returning functions
//! into handlers of this shape.
//!
//! [`Router`] dispatches to handlers by method and path pattern:
//!
//! | Pattern              | Example match              | Captured params                 |
//! |----------------------|----------------------------|---------------------------------|
//! | `/users`             | `/users`                   | *(none)*                        |
//! | `/users/:id`         | `/users/42`                | `id → "42"`                     |
//! | `/files/*`           | `/files/docs/readme.txt`   | `wildcard → "/docs/readme.txt"` |
//!
//! Trailing slashes are ignored on both patterns and paths. Routes are tried
//! in registration order and the first match wins.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::context::{Context, Parameters};
use crate::http::{Method, ResponseWriter, StatusCode};

/// A boxed, `Send` future borrowing for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The native handler shape: consume the context, write the response.
pub trait Handler: Send + Sync + 'static {
    /// Handle one request, writing the response into `writer`.
    fn call<'a>(&'a self, ctx: Context, writer: &'a mut ResponseWriter) -> BoxFuture<'a, ()>;
}

impl<H> Handler for Arc<H>
where
    H: Handler + ?Sized,
{
    fn call<'a>(&'a self, ctx: Context, writer: &'a mut ResponseWriter) -> BoxFuture<'a, ()> {
        (**self).call(ctx, writer)
    }
}

/// A [`Handler`] backed by a closure. Built with [`handler_fn`].
pub struct HandlerFn<F> {
    f: F,
}

/// Wraps a closure as a native [`Handler`].
///
/// ```rust
/// use rttpx::router::{Router, handler_fn};
/// use rttpx::StatusCode;
///
/// let mut router = Router::new();
/// router.get("/health", handler_fn(|_ctx, writer| Box::pin(async move {
///     writer.write_head(StatusCode::NO_CONTENT);
/// })));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(Context, &'a mut ResponseWriter) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    HandlerFn { f }
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(Context, &'a mut ResponseWriter) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: Context, writer: &'a mut ResponseWriter) -> BoxFuture<'a, ()> {
        (self.f)(ctx, writer)
    }
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Parameterized { segments: Vec<Segment> },
    Wildcard(String),
}

fn trim_trailing_slash(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}

impl Pattern {
    /// Compiles a pattern string: `/*` suffix → wildcard, any `:` → parameterized,
    /// otherwise exact.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Pattern::Wildcard(prefix.to_owned());
        }

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Parameter(name.to_owned()),
                    None => Segment::Static(s.to_owned()),
                })
                .collect();
            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_owned())
    }

    fn matches(&self, path: &str) -> Option<Parameters> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(Parameters::new),
            Pattern::Parameterized { segments } => {
                let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if parts.len() != segments.len() {
                    return None;
                }

                let mut params = Parameters::new();
                for (segment, part) in segments.iter().zip(parts) {
                    match segment {
                        Segment::Static(s) if s != part => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter(name) => params.insert(name.as_str(), part),
                    }
                }
                Some(params)
            }
            Pattern::Wildcard(prefix) => {
                let rest = path.strip_prefix(prefix.as_str())?;
                if !rest.is_empty() && !rest.starts_with('/') {
                    return None;
                }
                let mut params = Parameters::new();
                params.insert("wildcard", rest);
                Some(params)
            }
        }
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Arc<dyn Handler>,
}

/// Dispatches requests to native handlers by method and path.
///
/// Unmatched requests get an empty `404 Not Found`.
///
/// # Examples
///
/// ```rust
/// use rttpx::adapter::{ErrorCode, HandlerResult, Resolver};
/// use rttpx::context::Parameters;
/// use rttpx::{Request, Response, Router, StatusCode};
///
/// static NOT_FOUND: ErrorCode = ErrorCode::new("NOT_FOUND", StatusCode::NOT_FOUND);
///
/// async fn show_user(_req: Request, params: Parameters) -> HandlerResult {
///     match params.get("id") {
///         Some("0") | None => Err(NOT_FOUND.into()),
///         Some(id) => Err(Response::new(StatusCode::OK).text(id.to_owned()).into()),
///     }
/// }
///
/// let resolver = Resolver::default();
/// let mut router = Router::new();
/// router.get("/users/:id", resolver.routed(|req, params, _writer| {
///     Box::pin(show_user(req, params))
/// }));
/// assert_eq!(router.len(), 1);
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Create a router with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl Handler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Register `handler` for `POST` requests matching `path`.
    pub fn post(&mut self, path: &str, handler: impl Handler) {
        self.add_route(Method::Post, path, handler);
    }

    /// Register `handler` for `PUT` requests matching `path`.
    pub fn put(&mut self, path: &str, handler: impl Handler) {
        self.add_route(Method::Put, path, handler);
    }

    /// Register `handler` for `DELETE` requests matching `path`.
    pub fn delete(&mut self, path: &str, handler: impl Handler) {
        self.add_route(Method::Delete, path, handler);
    }

    /// Register `handler` for `PATCH` requests matching `path`.
    pub fn patch(&mut self, path: &str, handler: impl Handler) {
        self.add_route(Method::Patch, path, handler);
    }

    /// Register `handler` for `OPTIONS` requests matching `path`.
    pub fn options(&mut self, path: &str, handler: impl Handler) {
        self.add_route(Method::Options, path, handler);
    }

    /// Register `handler` for an arbitrary method.
    pub fn add_route(&mut self, method: Method, path: &str, handler: impl Handler) {
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler: Arc::new(handler),
        });
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch to the first route whose method and pattern match, or write
    /// an empty `404 Not Found`.
    pub async fn route(&self, ctx: Context, writer: &mut ResponseWriter) {
        let request = ctx.request();
        let matched = self.routes.iter().find_map(|route| {
            if &route.method != request.method() {
                return None;
            }
            route.pattern.matches(request.path()).map(|params| (route, params))
        });

        match matched {
            Some((route, params)) => {
                let ctx = Context::with_params(ctx.into_request(), params);
                route.handler.call(ctx, writer).await;
            }
            None => {
                debug!(method = %request.method(), path = request.path(), "no route matched");
                writer.write_head(StatusCode::NOT_FOUND);
            }
        }
    }
}

impl Handler for Router {
    fn call<'a>(&'a self, ctx: Context, writer: &'a mut ResponseWriter) -> BoxFuture<'a, ()> {
        Box::pin(self.route(ctx, writer))
    }
}
