mod common;

use std::sync::Arc;
use std::time::Duration;

use binance_mcp::errors::ItemKind;
use binance_mcp::server::Server;
use binance_mcp::transport::{ HttpClientOptions, HttpServerHandle, HttpServerOptions, SESSION_HEADER, TransportConfig };
use binance_mcp::{ Client, ClientConfig, Error };
use reqwest::StatusCode;
use serde_json::json;

use common::{ Probe, server };

async fn start(server: &Server) -> HttpServerHandle {
    let options = HttpServerOptions {
        bind_address: "127.0.0.1:0".to_string(),
        ..HttpServerOptions::default()
    };
    server.serve_http(options).await.unwrap()
}

async fn wait_for_sessions(handle: &HttpServerHandle, expected: usize) {
    for _ in 0..50 {
        if handle.session_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(handle.session_count(), expected);
}

async fn exercise(open_stream: bool) {
    let server = server(Arc::new(Probe::default()));
    let handle = start(&server).await;

    let options = HttpClientOptions {
        open_stream,
        ..HttpClientOptions::new(handle.url())
    };
    let client = Client::connect(&TransportConfig::Http(options), ClientConfig::default()).await.unwrap();
    assert_eq!(client.server_info().name, "test-server");
    assert_eq!(handle.session_count(), 1);

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 4);

    let output = client.call_tool("echo", json!({ "text": "over http" })).await.unwrap();
    assert_eq!(output.text().as_deref(), Some("over http"));

    let missing = client.call_tool("bogus", json!({})).await;
    assert!(matches!(missing, Err(Error::NotFound { kind: ItemKind::Tool, .. })));

    let note = client.read_resource("memo://notes/7").await.unwrap();
    assert_eq!(note.contents[0].text.as_deref(), Some("note 7"));

    client.close().await;
    wait_for_sessions(&handle, 0).await;

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_http_with_event_stream() {
    exercise(true).await;
}

#[tokio::test]
async fn test_http_with_inline_responses() {
    exercise(false).await;
}

#[tokio::test]
async fn test_http_concurrent_clients_get_separate_sessions() {
    let server = server(Arc::new(Probe::default()));
    let handle = start(&server).await;

    let config = TransportConfig::http(handle.url());
    let first = Client::connect(&config, ClientConfig::default()).await.unwrap();
    let second = Client::connect(&config, ClientConfig::default()).await.unwrap();
    assert_eq!(handle.session_count(), 2);

    let (a, b) = tokio::join!(
        first.call_tool("slow", json!({ "millis": 200, "label": "first" })),
        second.call_tool("echo", json!({ "text": "second" }))
    );
    assert_eq!(a.unwrap().text().as_deref(), Some("first"));
    assert_eq!(b.unwrap().text().as_deref(), Some("second"));

    first.close().await;
    wait_for_sessions(&handle, 1).await;
    second.ping().await.unwrap();

    second.close().await;
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_http_rejects_bad_requests() {
    let server = server(Arc::new(Probe::default()));
    let handle = start(&server).await;
    let http = reqwest::Client::new();

    // Only initialize may arrive without a session
    let response = http
        .post(handle.url())
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }))
        .send().await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = http
        .post(handle.url())
        .header(SESSION_HEADER, "no-such-session")
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }))
        .send().await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = http.post(handle.url()).body("{not json").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = http.delete(handle.url()).header(SESSION_HEADER, "no-such-session").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_http_single_event_stream_per_session() {
    let server = server(Arc::new(Probe::default()));
    let handle = start(&server).await;
    let http = reqwest::Client::new();

    let initialize =
        json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": { "name": "raw", "version": "0" }
        }
    });
    let response = http.post(handle.url()).json(&initialize).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response.headers().get(SESSION_HEADER).unwrap().to_str().unwrap().to_string();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["result"]["protocolVersion"], "2025-03-26");

    let stream = http.get(handle.url()).header(SESSION_HEADER, &session_id).send().await.unwrap();
    assert_eq!(stream.status(), StatusCode::OK);

    let second = http.get(handle.url()).header(SESSION_HEADER, &session_id).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let response = http.delete(handle.url()).header(SESSION_HEADER, &session_id).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    wait_for_sessions(&handle, 0).await;

    drop(stream);
    handle.shutdown().await.unwrap();
}
