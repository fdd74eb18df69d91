use std::net::SocketAddr;

use rttpx::adapter::{ErrorCode, HandlerResult, Resolver};
use rttpx::context::Parameters;
use rttpx::{Request, Response, Router, Server, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

static NOT_FOUND: ErrorCode = ErrorCode::new("NOT_FOUND", StatusCode::NOT_FOUND);

async fn missing(_req: Request) -> HandlerResult {
    Err(NOT_FOUND.into())
}

async fn fails(_req: Request) -> HandlerResult {
    let _n: i32 = "not a number".parse()?;
    Ok(())
}

async fn echo(req: Request) -> HandlerResult {
    let body = String::from_utf8_lossy(req.body()).into_owned();
    Err(Response::new(StatusCode::OK).text(body).into())
}

async fn silent(_req: Request) -> HandlerResult {
    Ok(())
}

async fn item(_req: Request, params: Parameters) -> HandlerResult {
    let id = params.get("id").unwrap_or_default().to_owned();
    Err(Response::new(StatusCode::OK).json(serde_json::json!({ "id": id })).into())
}

async fn start() -> SocketAddr {
    let resolver = Resolver::default();
    let mut router = Router::new();
    router.get("/missing", resolver.handler(|req, _w| Box::pin(missing(req))));
    router.get("/fails", resolver.handler(|req, _w| Box::pin(fails(req))));
    router.post("/echo", resolver.handler(|req, _w| Box::pin(echo(req))));
    router.get("/silent", resolver.handler(|req, _w| Box::pin(silent(req))));
    router.get(
        "/items/:id",
        resolver.routed(|req, params, _w| Box::pin(item(req, params))),
    );

    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.run(router));
    addr
}

async fn exchange(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

async fn get(addr: SocketAddr, path: &str) -> (String, String) {
    let raw = format!("GET {path} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n");
    let out = exchange(addr, &raw).await;
    let (head, body) = out.split_once("\r\n\r\n").unwrap();
    (head.to_owned(), body.to_owned())
}

#[tokio::test]
async fn error_code_is_sent_as_json() {
    let addr = start().await;
    let (head, body) = get(addr, "/missing").await;
    assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(head.contains("Content-Type: application/json"));
    assert_eq!(body, r#"{"code":"NOT_FOUND"}"#);
}

#[tokio::test]
async fn plain_error_becomes_bad_request() {
    let addr = start().await;
    let (head, body) = get(addr, "/fails").await;
    assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert_eq!(body, "invalid digit found in string");
}

#[tokio::test]
async fn request_body_reaches_the_handler() {
    let addr = start().await;
    let out = exchange(
        addr,
        "POST /echo HTTP/1.1\r\nHost: test\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
    )
    .await;
    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(out.ends_with("\r\n\r\nhello"));
}

#[tokio::test]
async fn route_params_are_passed_through() {
    let addr = start().await;
    let (head, body) = get(addr, "/items/abc").await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, r#"{"id":"abc"}"#);
}

#[tokio::test]
async fn handled_without_writing_sends_empty_ok() {
    let addr = start().await;
    let (head, body) = get(addr, "/silent").await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(body.is_empty());
}

#[tokio::test]
async fn unknown_route_is_404() {
    let addr = start().await;
    let (head, body) = get(addr, "/nowhere").await;
    assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(body.is_empty());
}

#[tokio::test]
async fn malformed_request_is_rejected() {
    let addr = start().await;
    let out = exchange(addr, "GET / HTTP/9.9\r\n\r\n").await;
    assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(out.contains("Bad Request: "));
}

#[tokio::test]
async fn overflowing_content_length_is_too_large() {
    let addr = start().await;
    let out = exchange(
        addr,
        "POST /echo HTTP/1.1\r\nHost: test\r\nContent-Length: 18446744073709551615\r\n\r\n",
    )
    .await;
    assert!(out.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    assert!(out.ends_with("Request entity too large"));
}

#[tokio::test]
async fn content_length_over_the_limit_is_too_large() {
    let addr = start().await;
    let out = exchange(
        addr,
        "POST /echo HTTP/1.1\r\nHost: test\r\nContent-Length: 9000000\r\n\r\n",
    )
    .await;
    assert!(out.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
}

#[tokio::test]
async fn unparsable_content_length_is_bad_request() {
    let addr = start().await;
    let out = exchange(
        addr,
        "POST /echo HTTP/1.1\r\nHost: test\r\nContent-Length: five\r\n\r\n",
    )
    .await;
    assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(out.contains("Connection: close\r\n"));
    assert!(out.ends_with("Bad Request: invalid Content-Length: \"five\""));
}

#[tokio::test]
async fn keep_alive_serves_pipelined_requests() {
    let addr = start().await;
    let out = exchange(
        addr,
        "GET /missing HTTP/1.1\r\nHost: test\r\n\r\n\
         GET /items/7 HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
    )
    .await;

    let (first, second) = out.split_once("0\r\n\r\n").unwrap();
    assert!(first.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(first.contains("Transfer-Encoding: chunked\r\n"));
    assert!(first.contains("Connection: keep-alive\r\n"));
    assert!(first.ends_with("14\r\n{\"code\":\"NOT_FOUND\"}\r\n"));

    assert!(second.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(second.contains("Connection: close\r\n"));
    assert!(second.ends_with("\r\n\r\n{\"id\":\"7\"}"));
}
