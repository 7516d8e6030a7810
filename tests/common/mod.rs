#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::time::Duration;

use binance_mcp::errors::Error;
use binance_mcp::registry::{
    ParamType,
    ParameterSchema,
    PromptSpec,
    Registry,
    ResourceBody,
    ResourceSpec,
    ResourceTemplateSpec,
    ToolSpec,
};
use binance_mcp::server::Server;
use binance_mcp::transport::{ MemoryTransport, memory };
use binance_mcp::types::{ PromptArgument, ToolError };
use binance_mcp::{ Client, ClientConfig, ToolParams };
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;

/// Counters the test tools update so tests can see what ran
#[derive(Default)]
pub struct Probe {
    pub echo_calls: AtomicUsize,
    pub slow_started: AtomicUsize,
    pub slow_finished: AtomicUsize,
}

impl Probe {
    pub fn echo_calls(&self) -> usize {
        self.echo_calls.load(Ordering::SeqCst)
    }

    pub fn slow_finished(&self) -> usize {
        self.slow_finished.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Deserialize, ToolParams)]
pub struct SlowArgs {
    #[param(description = "How long to sleep")]
    pub millis: u64,
    #[param(description = "Returned when done")]
    pub label: String,
}

pub fn registry(probe: Arc<Probe>) -> Registry {
    let mut builder = Registry::builder();

    let echo_probe = Arc::clone(&probe);
    builder
        .register_tool(
            ToolSpec::from_fn(
                "echo",
                "Echo the given text",
                ParameterSchema::new().required("text", ParamType::String, "Text to echo"),
                move |args| {
                    echo_probe.echo_calls.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(args.get("text").cloned().unwrap_or(Value::Null)) }
                }
            )
        )
        .unwrap();

    let slow_probe = Arc::clone(&probe);
    builder
        .register_tool(
            ToolSpec::typed("slow", "Sleep, then return the label", move |args: SlowArgs| {
                let probe = Arc::clone(&slow_probe);
                async move {
                    probe.slow_started.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(args.millis)).await;
                    probe.slow_finished.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::String(args.label))
                }
            })
        )
        .unwrap();

    builder
        .register_tool(
            ToolSpec::from_fn(
                "fail",
                "Fail with the given code",
                ParameterSchema::new().required("code", ParamType::Integer, "Error code"),
                |args| async move {
                    let code = args.get("code").and_then(Value::as_i64).unwrap_or(500);
                    Err(ToolError::new(code, "upstream refused"))
                }
            )
        )
        .unwrap();

    builder
        .register_tool(
            ToolSpec::from_fn("nothing", "Return null", ParameterSchema::new(), |_args| async {
                Ok(Value::Null)
            })
        )
        .unwrap();

    builder
        .register_resource(
            ResourceSpec::from_fn("memo://greeting", "greeting", |_uri, _vars| async {
                Ok(ResourceBody::from("hello"))
            }).with_mime_type("text/plain")
        )
        .unwrap();

    builder
        .register_resource_template(
            ResourceTemplateSpec::from_fn("memo://notes/{id}", "note", |_uri, vars| async move {
                Ok(ResourceBody::Text(format!("note {}", vars.get("id").cloned().unwrap_or_default())))
            }).unwrap()
        )
        .unwrap();

    builder
        .register_prompt(
            PromptSpec::from_text(
                "greet",
                "Greet someone",
                vec![PromptArgument::required("name", "Who to greet")],
                |args| Ok(format!("Say hello to {}", args.get("name").cloned().unwrap_or_default()))
            )
        )
        .unwrap();

    builder.build()
}

pub fn server(probe: Arc<Probe>) -> Server {
    Server::builder().name("test-server").version("0.0.1").registry(registry(probe)).build()
}

/// A client connected to `server` over an in-memory pipe
pub struct Harness {
    pub client: Client,
    /// Server end of the pipe, for simulating the server going away
    pub server_transport: Arc<MemoryTransport>,
    pub session: JoinHandle<Result<(), Error>>,
}

pub async fn connect(server: &Server, config: ClientConfig) -> Result<Harness, Error> {
    let (client_side, server_side) = memory::pair();
    let server_transport = Arc::new(server_side);
    let session = tokio::spawn(server.session(server_transport.clone()).run());
    let client = Client::connect_with(Arc::new(client_side), config).await?;
    Ok(Harness {
        client,
        server_transport,
        session,
    })
}
