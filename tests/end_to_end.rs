mod common;

use std::collections::HashMap;
use std::sync::{ Arc, Mutex };
use std::time::Duration;

use binance_mcp::errors::ItemKind;
use binance_mcp::transport::Transport;
use binance_mcp::types::LATEST_PROTOCOL_VERSION;
use binance_mcp::{ ClientConfig, Error };
use serde_json::{ Value, json };

use common::{ Probe, connect, server };

fn unvalidated() -> ClientConfig {
    ClientConfig {
        validate_arguments: false,
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn test_handshake_and_ordered_listing() {
    let server = server(Arc::new(Probe::default()));
    let harness = connect(&server, ClientConfig::default()).await.unwrap();
    let client = &harness.client;

    assert_eq!(client.server_info().name, "test-server");
    assert_eq!(client.protocol_version(), LATEST_PROTOCOL_VERSION);
    let capabilities = &client.negotiated().capabilities;
    assert!(capabilities.tools.is_some());
    assert!(capabilities.resources.is_some());
    assert!(capabilities.prompts.is_some());

    let names: Vec<String> = client
        .list_tools().await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["echo", "slow", "fail", "nothing"]);
}

#[tokio::test]
async fn test_echo() {
    let server = server(Arc::new(Probe::default()));
    let harness = connect(&server, ClientConfig::default()).await.unwrap();

    let output = harness.client.call_tool("echo", json!({ "text": "hi" })).await.unwrap();
    assert_eq!(output.text().as_deref(), Some("hi"));
}

#[tokio::test]
async fn test_null_result_stays_null() {
    let server = server(Arc::new(Probe::default()));
    let harness = connect(&server, ClientConfig::default()).await.unwrap();

    let output = harness.client.call_tool("nothing", json!({})).await.unwrap();
    assert_eq!(output.structured, Some(Value::Null));
    assert_eq!(output.value(), Value::Null);
}

#[tokio::test]
async fn test_unknown_tool_keeps_session_ready() {
    let server = server(Arc::new(Probe::default()));
    let harness = connect(&server, ClientConfig::default()).await.unwrap();
    let client = &harness.client;

    match client.call_tool("bogus", json!({})).await {
        Err(Error::NotFound { kind: ItemKind::Tool, name }) => assert_eq!(name, "bogus"),
        other => panic!("expected NotFound, got {:?}", other),
    }

    let output = client.call_tool("echo", json!({ "text": "still here" })).await.unwrap();
    assert_eq!(output.text().as_deref(), Some("still here"));
}

#[tokio::test]
async fn test_missing_argument_is_rejected_by_server() {
    let probe = Arc::new(Probe::default());
    let server = server(Arc::clone(&probe));
    let harness = connect(&server, unvalidated()).await.unwrap();

    match harness.client.call_tool("echo", json!({})).await {
        Err(Error::Validation { fields }) => {
            assert_eq!(fields.len(), 1);
            assert_eq!(fields[0].field, "text");
        }
        other => panic!("expected Validation, got {:?}", other),
    }
    assert_eq!(probe.echo_calls(), 0);
}

#[tokio::test]
async fn test_wrong_type_is_rejected_by_client() {
    let probe = Arc::new(Probe::default());
    let server = server(Arc::clone(&probe));
    let harness = connect(&server, ClientConfig::default()).await.unwrap();

    harness.client.list_tools().await.unwrap();
    let result = harness.client.call_tool("echo", json!({ "text": 42 })).await;
    assert!(matches!(result, Err(Error::Validation { .. })));
    assert_eq!(probe.echo_calls(), 0);
}

#[tokio::test]
async fn test_slow_call_does_not_block_fast_call() {
    let server = server(Arc::new(Probe::default()));
    let harness = connect(&server, ClientConfig::default()).await.unwrap();
    let client = &harness.client;
    let finished = Mutex::new(Vec::new());

    let a = async {
        let output = client.call_tool("slow", json!({ "millis": 500, "label": "A" })).await.unwrap();
        finished.lock().unwrap().push(output.text().unwrap());
    };
    let b = async {
        let output = client.call_tool("slow", json!({ "millis": 10, "label": "B" })).await.unwrap();
        finished.lock().unwrap().push(output.text().unwrap());
    };
    tokio::join!(a, b);

    assert_eq!(*finished.lock().unwrap(), vec!["B".to_string(), "A".to_string()]);
}

#[tokio::test]
async fn test_tool_failure_surfaces_code() {
    let server = server(Arc::new(Probe::default()));
    let harness = connect(&server, ClientConfig::default()).await.unwrap();

    match harness.client.call_tool("fail", json!({ "code": 451 })).await {
        Err(Error::RemoteTool { code, message }) => {
            assert_eq!(code, 451);
            assert_eq!(message, "upstream refused");
        }
        other => panic!("expected RemoteTool, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_close_fails_pending_call() {
    let server = server(Arc::new(Probe::default()));
    let harness = connect(&server, ClientConfig::default()).await.unwrap();

    let server_transport = Arc::clone(&harness.server_transport);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        server_transport.close().await.unwrap();
    });

    let result = harness.client.call_tool("slow", json!({ "millis": 5000, "label": "never" })).await;
    assert!(matches!(result, Err(Error::SessionClosed(_))), "got {:?}", result);

    // New calls fail fast once the connection is gone
    let again = harness.client.ping().await;
    assert!(matches!(again, Err(Error::SessionClosed(_))));
}

#[tokio::test]
async fn test_timeout_cancels_the_call() {
    let probe = Arc::new(Probe::default());
    let server = server(Arc::clone(&probe));
    let harness = connect(&server, ClientConfig::default()).await.unwrap();
    let client = &harness.client;

    let result = client.call_tool_with_timeout(
        "slow",
        json!({ "millis": 600, "label": "late" }),
        Duration::from_millis(100)
    ).await;
    assert!(matches!(result, Err(Error::Timeout(_))));

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(probe.slow_finished(), 0);

    let output = client.call_tool("echo", json!({ "text": "after" })).await.unwrap();
    assert_eq!(output.text().as_deref(), Some("after"));
}

#[tokio::test]
async fn test_version_negotiation() {
    let server = server(Arc::new(Probe::default()));

    let older = ClientConfig {
        protocol_version: "2024-11-05".to_string(),
        ..ClientConfig::default()
    };
    let harness = connect(&server, older).await.unwrap();
    assert_eq!(harness.client.protocol_version(), "2024-11-05");

    let newer = ClientConfig {
        protocol_version: "2099-01-01".to_string(),
        ..ClientConfig::default()
    };
    let harness = connect(&server, newer).await.unwrap();
    assert_eq!(harness.client.protocol_version(), LATEST_PROTOCOL_VERSION);

    let bogus = ClientConfig {
        protocol_version: "1.0".to_string(),
        ..ClientConfig::default()
    };
    let result = connect(&server, bogus).await;
    assert!(matches!(result, Err(Error::IncompatibleVersion(_))));
}

#[tokio::test]
async fn test_resources() {
    let server = server(Arc::new(Probe::default()));
    let harness = connect(&server, ClientConfig::default()).await.unwrap();
    let client = &harness.client;

    let resources = client.list_resources().await.unwrap();
    assert_eq!(resources[0].uri, "memo://greeting");
    let templates = client.list_resource_templates().await.unwrap();
    assert_eq!(templates[0].uri_template, "memo://notes/{id}");

    let fixed = client.read_resource("memo://greeting").await.unwrap();
    assert_eq!(fixed.contents[0].text.as_deref(), Some("hello"));

    let templated = client.read_resource("memo://notes/42").await.unwrap();
    assert_eq!(templated.contents[0].text.as_deref(), Some("note 42"));

    let missing = client.read_resource("memo://nothing").await;
    assert!(matches!(missing, Err(Error::NotFound { kind: ItemKind::Resource, .. })));
}

#[tokio::test]
async fn test_prompts() {
    let server = server(Arc::new(Probe::default()));
    let harness = connect(&server, ClientConfig::default()).await.unwrap();
    let client = &harness.client;

    let prompts = client.list_prompts().await.unwrap();
    assert_eq!(prompts[0].name, "greet");
    assert!(prompts[0].arguments[0].required);

    let arguments = HashMap::from([("name".to_string(), "Ada".to_string())]);
    let rendered = client.get_prompt("greet", arguments).await.unwrap();
    assert_eq!(rendered.messages[0].content.as_text(), Some("Say hello to Ada"));

    let missing = client.get_prompt("greet", HashMap::new()).await;
    match missing {
        Err(Error::Validation { fields }) => assert_eq!(fields[0].field, "name"),
        other => panic!("expected Validation, got {:?}", other),
    }

    let unknown = client.get_prompt("nope", HashMap::new()).await;
    assert!(matches!(unknown, Err(Error::NotFound { kind: ItemKind::Prompt, .. })));
}

#[tokio::test]
async fn test_shutdown_ends_the_session() {
    let server = server(Arc::new(Probe::default()));
    let harness = connect(&server, ClientConfig::default()).await.unwrap();

    harness.client.ping().await.unwrap();
    harness.client.shutdown().await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(2), harness.session).await;
    assert!(outcome.unwrap().unwrap().is_ok());
}
