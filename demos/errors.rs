//! Demo server exercising every way a handler can end.
//!
//! ```text
//! cargo run --example errors
//! curl -i localhost:8080/hellox            # 200 {"hello":"world"}
//! curl -i 'localhost:8080/hellox?x=1'      # 404 {"code":"NOT_FOUND"}
//! curl -i localhost:8080/hello             # 400 plain text
//! curl -i localhost:8080/private           # 401 with chained headers
//! curl -i localhost:8080/users/0           # 404 {"code":"NOT_FOUND","extra":{"id":"0"}}
//! curl -i localhost:8080/raw               # written by hand
//! curl -i --data-binary @Cargo.toml localhost:8080/stream
//! ```

use rttpx::adapter::{ErrorCode, HandlerResult, Resolver, ResolverConfig, log_resolution};
use rttpx::context::Parameters;
use rttpx::{Request, Response, ResponseWriter, Router, Server, StatusCode};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static ERR_NOT_FOUND: ErrorCode = ErrorCode::new("NOT_FOUND", StatusCode::NOT_FOUND);
static ERR_CREATING_FILE: ErrorCode = ErrorCode::new("CREATING_FILE", StatusCode::BAD_REQUEST);
static ERR_COPY_FILE: ErrorCode = ErrorCode::new("COPY_FILE", StatusCode::BAD_REQUEST);
static ERR_OPEN_FILE: ErrorCode = ErrorCode::new("OPEN_FILE", StatusCode::BAD_REQUEST);

#[derive(Debug, Error)]
#[error("plain text and returns a 400")]
struct PlainError;

async fn hellox(req: Request) -> HandlerResult {
    if req.has_query() {
        return Err(ERR_NOT_FOUND.into());
    }

    // Successful responses can travel the error path too.
    Err(Response::new(StatusCode::OK)
        .json(serde_json::json!({ "hello": "world" }))
        .into())
}

async fn hello(_req: Request) -> HandlerResult {
    Err(PlainError.into())
}

async fn private(_req: Request) -> HandlerResult {
    Err(Response::new(StatusCode::UNAUTHORIZED)
        .with_headers([("Content-Type", "hello/world")])
        .with_headers([("X-Chainable", "headers")])
        .text("Unauthorized")
        .into())
}

async fn stream(req: Request) -> HandlerResult {
    let tmp = std::env::temp_dir().join("rttpx-upload");

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| ERR_CREATING_FILE.json_with(e.to_string()))?;
    file.write_all(req.body())
        .await
        .map_err(|e| ERR_COPY_FILE.json_with(e.to_string()))?;
    file.flush()
        .await
        .map_err(|e| ERR_COPY_FILE.json_with(e.to_string()))?;
    drop(file);

    let file = tokio::fs::File::open(&tmp)
        .await
        .map_err(|e| ERR_OPEN_FILE.json_with(e.to_string()))?;

    Err(Response::new(StatusCode::OK)
        .header("Content-Type", "application/octet-stream")
        .closing_reader(file)
        .into())
}

async fn show_user(_req: Request, params: Parameters) -> HandlerResult {
    match params.get("id") {
        Some("0") | None => Err(ERR_NOT_FOUND
            .json_with(serde_json::json!({ "id": params.get("id") }))
            .into()),
        Some(id) => Err(Response::new(StatusCode::OK)
            .json(serde_json::json!({ "id": id }))
            .into()),
    }
}

async fn raw(writer: &mut ResponseWriter) -> HandlerResult {
    writer.set_header("Content-Type", "text/plain");
    writer.write_head(StatusCode::OK);
    writer.write_all(b"written by hand\n").await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rttpx=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let resolver = Resolver::new(
        ResolverConfig::default()
            .classify_with(|err| Response::new(StatusCode::BAD_REQUEST).text(err.to_string()))
            .on_copy_error(|err| tracing::warn!(error = %err, "response body cut short"))
            .after(log_resolution),
    );

    let mut router = Router::new();
    router.get("/hellox", resolver.handler(|req, _w| Box::pin(hellox(req))));
    router.get("/hello", resolver.handler(|req, _w| Box::pin(hello(req))));
    router.get("/private", resolver.handler(|req, _w| Box::pin(private(req))));
    router.post("/stream", resolver.handler(|req, _w| Box::pin(stream(req))));
    router.get(
        "/users/:id",
        resolver.routed(|req, params, _w| Box::pin(show_user(req, params))),
    );
    router.get("/raw", resolver.handler(|_req, w| Box::pin(raw(w))));

    let server = Server::bind("127.0.0.1:8080").await?;
    tracing::info!(address = %server.local_addr(), "demo ready");
    server.run(router).await?;
    Ok(())
}
