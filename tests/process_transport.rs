use std::collections::HashMap;

use binance_mcp::handlers::ACTIVITY_LOG_URI;
use binance_mcp::transport::TransportConfig;
use binance_mcp::{ Client, ClientConfig, Error };
use serde_json::json;
use tempfile::TempDir;

fn server_config(dir: &TempDir) -> TransportConfig {
    let log = dir.path().join("activity.log");
    TransportConfig::process(env!("CARGO_BIN_EXE_binance-mcp-server"), vec![
        "--transport".to_string(),
        "stdio".to_string(),
        "--activity-log".to_string(),
        log.display().to_string(),
        // Nothing listens here, so lookups fail fast
        "--binance-api-url".to_string(),
        "http://127.0.0.1:9".to_string(),
        "--binance-data-url".to_string(),
        "http://127.0.0.1:9".to_string(),
        "-q".to_string()
    ])
}

#[tokio::test]
async fn test_spawned_server_offers_binance_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let client = Client::connect(&server_config(&dir), ClientConfig::default()).await.unwrap();

    assert_eq!(client.server_info().name, "Binance MCP");

    let tools: Vec<String> = client
        .list_tools().await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(tools, vec!["get_price", "get_price_price_change"]);

    let prompts: Vec<String> = client
        .list_prompts().await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(prompts, vec!["executive_summary", "crypto_summary"]);

    let arguments = HashMap::from([("crypto".to_string(), "ethereum".to_string())]);
    let prompt = client.get_prompt("crypto_summary", arguments).await.unwrap();
    assert!(prompt.messages[0].content.as_text().unwrap().contains("ethereum"));

    let log = client.read_resource(ACTIVITY_LOG_URI).await.unwrap();
    assert_eq!(log.contents[0].text.as_deref(), Some(""));

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_api_is_a_tool_failure() {
    let dir = tempfile::tempdir().unwrap();
    let client = Client::connect(&server_config(&dir), ClientConfig::default()).await.unwrap();
    client.list_tools().await.unwrap();

    let result = client.call_tool("get_price", json!({ "symbol": "bitcoin" })).await;
    match result {
        Err(Error::RemoteTool { message, .. }) => assert!(message.contains("BTCUSDT"), "{}", message),
        other => panic!("expected RemoteTool, got {:?}", other),
    }

    // The session survives a failed call
    let missing = client.call_tool("get_price", json!({})).await;
    assert!(matches!(missing, Err(Error::Validation { .. })));
    client.ping().await.unwrap();

    client.shutdown().await.unwrap();
}
