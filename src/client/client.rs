//! Protocol client
//!
//! A [`Client`] owns one transport, runs a background task that reads every
//! incoming message, and correlates responses with the calls waiting on them.
//! Construction performs the full handshake, so a `Client` in hand is always
//! initialized.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jsonschema::JSONSchema;
use serde::de::DeserializeOwned;
use serde_json::{ Map, Value, json };
use tokio::sync::{ RwLock, broadcast };
use tokio::task::JoinHandle;
use tracing::{ debug, error, info, warn };

use crate::errors::{ Error, FieldError };
use crate::messages::{ Message, Notification, Request, RequestId, Response, methods };
use crate::registry::ParameterSchema;
use crate::transport::{ Transport, TransportConfig };
use crate::types::{
    CallToolParams,
    CallToolResult,
    CancelledParams,
    ClientCapabilities,
    GetPromptParams,
    GetPromptResult,
    Implementation,
    InitializeRequestParams,
    InitializeResult,
    LATEST_PROTOCOL_VERSION,
    ListPromptsResult,
    ListResourceTemplatesResult,
    ListResourcesResult,
    ListToolsResult,
    Prompt,
    ReadResourceParams,
    ReadResourceResult,
    Resource,
    ResourceTemplate,
    Tool,
    ToolOutput,
    is_supported_version,
};

use super::requests::RequestManager;

/// Default timeout for requests
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Default timeout for the whole handshake
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Name and version sent in `initialize`
    pub client_info: Implementation,
    /// Capabilities declared to the server
    pub capabilities: ClientCapabilities,
    /// Protocol version requested from the server
    pub protocol_version: String,
    /// Timeout for each request
    pub request_timeout: Duration,
    /// Timeout for `initialize`
    pub handshake_timeout: Duration,
    /// Check tool arguments against the advertised schema before sending
    pub validate_arguments: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            capabilities: ClientCapabilities::default(),
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            validate_arguments: true,
        }
    }
}

/// A listed tool with its compiled validators
struct CachedTool {
    parameters: ParameterSchema,
    validator: Option<JSONSchema>,
}

impl CachedTool {
    fn new(tool: &Tool) -> Self {
        let validator = match JSONSchema::compile(&tool.input_schema) {
            Ok(validator) => Some(validator),
            Err(e) => {
                warn!("Tool {} advertises an invalid schema: {}", tool.name, e);
                None
            }
        };
        Self {
            parameters: tool.parameters(),
            validator,
        }
    }

    fn validate(&self, arguments: &Map<String, Value>) -> Result<(), Error> {
        self.parameters.validate(arguments)?;

        let Some(validator) = &self.validator else {
            return Ok(());
        };
        // Null means absent, as on the server
        let instance = Value::Object(
            arguments
                .iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        );
        if let Err(errors) = validator.validate(&instance) {
            let fields = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    let field = path.trim_start_matches('/');
                    FieldError::new(if field.is_empty() { "arguments" } else { field }, e.to_string())
                })
                .collect();
            return Err(Error::Validation { fields });
        }
        Ok(())
    }
}

/// Transport plus correlation state, shared by the handshake and the client
struct Connection {
    transport: Arc<dyn Transport>,
    requests: Arc<RequestManager>,
}

impl Connection {
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), Error> {
        self.transport.send(&Message::Notification(Notification::new(method, params))).await
    }

    /// Send a request and wait for its response, cancelling it on timeout
    async fn request(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value, Error> {
        let id = self.requests.next_id();
        let waiter = self.requests.register(id.clone()).await?;
        let request = Message::Request(Request::new(id.clone(), method, params));
        debug!("Sending {} request {}", method, id);

        let exchange = async {
            if let Err(e) = self.transport.send(&request).await {
                self.requests.forget(&id).await;
                if self.requests.is_closed().await || !self.transport.is_connected() {
                    return Err(Error::SessionClosed(e.to_string()));
                }
                return Err(e);
            }
            waiter.await.map_err(|_| Error::SessionClosed("Response channel dropped".to_string()))?
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                self.requests.forget(&id).await;
                self.cancel(&id, "timeout").await;
                Err(Error::Timeout(format!("{} request {} timed out after {:?}", method, id, timeout)))
            }
        }
    }

    async fn cancel(&self, id: &RequestId, reason: &str) {
        let params = CancelledParams {
            request_id: id.clone(),
            reason: Some(reason.to_string()),
        };
        let params = match serde_json::to_value(params) {
            Ok(params) => params,
            Err(e) => {
                warn!("Failed to encode cancellation for {}: {}", id, e);
                return;
            }
        };
        if let Err(e) = self.notify(methods::CANCELLED, Some(params)).await {
            debug!("Could not send cancellation for {}: {}", id, e);
        }
    }

    async fn close(&self, reason: &str) {
        self.requests.fail_all(reason).await;
        if let Err(e) = self.transport.close().await {
            warn!("Error closing transport: {}", e);
        }
    }
}

/// Read every incoming message until the transport ends
async fn read_loop(
    transport: Arc<dyn Transport>,
    requests: Arc<RequestManager>,
    notifications: broadcast::Sender<Notification>
) {
    let reason = loop {
        match transport.receive().await {
            Ok(Some(Message::Response(response))) => {
                requests.complete(response).await;
            }
            Ok(Some(Message::Notification(notification))) => {
                debug!("Received notification {}", notification.method);
                // No subscribers is fine
                let _ = notifications.send(notification);
            }
            Ok(Some(Message::Request(request))) => {
                let response = if request.method == methods::PING {
                    Response::success(request.id, json!({}))
                } else {
                    let error = Error::MethodNotFound(request.method.clone());
                    Response::error(request.id, error.to_error_data())
                };
                if let Err(e) = transport.send(&Message::Response(response)).await {
                    warn!("Failed to answer server request: {}", e);
                }
            }
            Ok(None) => {
                break "Server closed the connection".to_string();
            }
            Err(Error::MalformedMessage { reason, .. }) => {
                warn!("Ignoring malformed message from server: {}", reason);
            }
            Err(e) => {
                error!("Transport failed: {}", e);
                break format!("Transport failed: {}", e);
            }
        }
    };

    info!("Client connection ended: {}", reason);
    requests.fail_all(&reason).await;
}

async fn handshake(connection: &Connection, config: &ClientConfig) -> Result<InitializeResult, Error> {
    let params = InitializeRequestParams {
        protocol_version: config.protocol_version.clone(),
        capabilities: config.capabilities.clone(),
        client_info: Some(config.client_info.clone()),
    };

    let value = connection
        .request(methods::INITIALIZE, Some(serde_json::to_value(params)?), config.handshake_timeout).await
        .map_err(|e| {
            match e {
                Error::IncompatibleVersion(_) | Error::Handshake(_) => e,
                Error::Timeout(_) => Error::Handshake("Server did not answer initialize in time".to_string()),
                other => Error::Handshake(other.to_string()),
            }
        })?;

    let result: InitializeResult = serde_json
        ::from_value(value)
        .map_err(|e| Error::Handshake(format!("Invalid initialize result: {}", e)))?;

    if !is_supported_version(&result.protocol_version) {
        return Err(Error::IncompatibleVersion(format!("Server answered with unsupported version {}", result.protocol_version)));
    }

    connection.notify(methods::INITIALIZED, None).await?;
    Ok(result)
}

/// Client for a single server connection
pub struct Client {
    connection: Connection,
    config: ClientConfig,
    server: InitializeResult,
    notifications: broadcast::Sender<Notification>,
    tools: RwLock<HashMap<String, Arc<CachedTool>>>,
    reader: JoinHandle<()>,
}

impl Client {
    /// Open the transport described by `transport` and perform the handshake
    pub async fn connect(transport: &TransportConfig, config: ClientConfig) -> Result<Self, Error> {
        let transport = transport.connect().await?;
        Self::connect_with(transport, config).await
    }

    /// Perform the handshake over an already open transport
    pub async fn connect_with(transport: Arc<dyn Transport>, config: ClientConfig) -> Result<Self, Error> {
        let requests = Arc::new(RequestManager::new());
        let (notifications, _) = broadcast::channel(64);
        let reader = tokio::spawn(read_loop(Arc::clone(&transport), Arc::clone(&requests), notifications.clone()));
        let connection = Connection { transport, requests };

        let server = match handshake(&connection, &config).await {
            Ok(server) => server,
            Err(e) => {
                warn!("Handshake failed: {}", e);
                connection.close("Handshake failed").await;
                reader.abort();
                return Err(e);
            }
        };

        info!(
            "Connected to {} {} using protocol {}",
            server.server_info.name,
            server.server_info.version,
            server.protocol_version
        );

        Ok(Self {
            connection,
            config,
            server,
            notifications,
            tools: RwLock::new(HashMap::new()),
            reader,
        })
    }

    /// The server's `initialize` answer
    pub fn negotiated(&self) -> &InitializeResult {
        &self.server
    }

    pub fn server_info(&self) -> &Implementation {
        &self.server.server_info
    }

    pub fn protocol_version(&self) -> &str {
        &self.server.protocol_version
    }

    /// Receive notifications sent by the server
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.transport.is_connected() && !self.reader.is_finished()
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<T, Error> {
        let value = self.connection.request(method, params, timeout).await?;
        serde_json::from_value(value).map_err(|e| Error::Protocol(format!("Unexpected {} result: {}", method, e)))
    }

    /// List the server's tools and remember their schemas for validation
    pub async fn list_tools(&self) -> Result<Vec<Tool>, Error> {
        let result: ListToolsResult = self.call(methods::TOOLS_LIST, None, self.config.request_timeout).await?;

        let mut cache = self.tools.write().await;
        cache.clear();
        for tool in &result.tools {
            cache.insert(tool.name.clone(), Arc::new(CachedTool::new(tool)));
        }
        Ok(result.tools)
    }

    /// Call a tool with the default request timeout
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, Error> {
        self.call_tool_with_timeout(name, arguments, self.config.request_timeout).await
    }

    /// Call a tool; a timeout cancels the call on the server
    pub async fn call_tool_with_timeout(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration
    ) -> Result<ToolOutput, Error> {
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(Error::InvalidParams(format!("Tool arguments must be an object, got {}", other)));
            }
        };

        if self.config.validate_arguments {
            let cached = self.tools.read().await.get(name).cloned();
            if let Some(cached) = cached {
                cached.validate(&arguments)?;
            }
        }

        let params = CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        let result: CallToolResult = self.call(methods::TOOLS_CALL, Some(serde_json::to_value(params)?), timeout).await?;
        result.into_output()
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>, Error> {
        let result: ListResourcesResult = self.call(methods::RESOURCES_LIST, None, self.config.request_timeout).await?;
        Ok(result.resources)
    }

    pub async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, Error> {
        let result: ListResourceTemplatesResult = self.call(
            methods::RESOURCES_TEMPLATES_LIST,
            None,
            self.config.request_timeout
        ).await?;
        Ok(result.resource_templates)
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, Error> {
        let params = ReadResourceParams { uri: uri.to_string() };
        self.call(methods::RESOURCES_READ, Some(serde_json::to_value(params)?), self.config.request_timeout).await
    }

    pub async fn list_prompts(&self) -> Result<Vec<Prompt>, Error> {
        let result: ListPromptsResult = self.call(methods::PROMPTS_LIST, None, self.config.request_timeout).await?;
        Ok(result.prompts)
    }

    pub async fn get_prompt(&self, name: &str, arguments: HashMap<String, String>) -> Result<GetPromptResult, Error> {
        let params = GetPromptParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        self.call(methods::PROMPTS_GET, Some(serde_json::to_value(params)?), self.config.request_timeout).await
    }

    pub async fn ping(&self) -> Result<(), Error> {
        self.connection.request(methods::PING, None, self.config.request_timeout).await?;
        Ok(())
    }

    /// Ask the server to end the session, then close the connection
    pub async fn shutdown(self) -> Result<(), Error> {
        let result = self.connection.request(methods::SHUTDOWN, None, self.config.request_timeout).await;
        self.close().await;
        match result {
            Ok(_) | Err(Error::SessionClosed(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Close the connection; pending calls fail with `SessionClosed`
    pub async fn close(self) {
        info!("Closing client connection to {}", self.server.server_info.name);
        self.connection.close("Client closed the connection").await;
        self.reader.abort();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ParamType;

    fn echo_tool() -> Tool {
        Tool {
            name: "echo".to_string(),
            description: "Echo".to_string(),
            input_schema: ParameterSchema::new()
                .required("text", ParamType::String, "Text to echo")
                .optional("times", ParamType::Integer, "Repeat count")
                .to_json_schema(),
        }
    }

    #[test]
    fn test_cached_tool_accepts_valid_arguments() {
        let cached = CachedTool::new(&echo_tool());
        let arguments = json!({ "text": "hi", "times": null });
        assert!(cached.validate(arguments.as_object().unwrap()).is_ok());
    }

    #[test]
    fn test_cached_tool_names_the_bad_field() {
        let cached = CachedTool::new(&echo_tool());
        let arguments = json!({ "text": "hi", "times": "three" });
        match cached.validate(arguments.as_object().unwrap()) {
            Err(Error::Validation { fields }) => {
                assert_eq!(fields[0].field, "times");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_default_config_requests_latest_version() {
        let config = ClientConfig::default();
        assert_eq!(config.protocol_version, LATEST_PROTOCOL_VERSION);
        assert!(config.validate_arguments);
    }
}
