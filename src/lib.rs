//! # rttpx
//!
//! Error-returning HTTP handlers on top of a small async HTTP/1.1 server.
//!
//! Handlers return a [`HandlerResult`] instead of writing the response
//! themselves. A [`Resolver`] turns the result into bytes on the wire:
//! returned [`Response`]s and [`ErrorCode`]s are written as-is, any other
//! error goes through a configurable classifier, and `Ok(())` leaves a
//! response the handler wrote by hand untouched.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rttpx::adapter::{ErrorCode, HandlerResult, Resolver, ResolverConfig, log_resolution};
//! use rttpx::{Request, Response, Router, Server, StatusCode};
//!
//! static NOT_FOUND: ErrorCode = ErrorCode::new("NOT_FOUND", StatusCode::NOT_FOUND);
//!
//! async fn hello(req: Request) -> HandlerResult {
//!     if req.has_query() {
//!         return Err(NOT_FOUND.into());
//!     }
//!     Err(Response::new(StatusCode::OK).json(serde_json::json!({ "hello": "world" })).into())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = Resolver::new(ResolverConfig::default().after(log_resolution));
//!     let mut router = Router::new();
//!     router.get("/hello", resolver.handler(|req, _writer| Box::pin(hello(req))));
//!
//!     Server::bind("127.0.0.1:8080").await?.run(router).await?;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod context;
pub mod http;
pub mod router;
pub mod server;

#[cfg(test)]
mod testing;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use adapter::{ErrorCode, HandlerError, HandlerResult, Outcome, Resolver, ResolverConfig};
pub use http::{Headers, Method, Request, Response, ResponseWriter, StatusCode};
pub use router::{BoxFuture, Handler, Router};
pub use server::{Server, ServerError};
