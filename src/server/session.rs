//! Server Session Engine
//!
//! One [`ServerSession`] drives one connection. A reader task pulls frames off
//! the transport while the session loop dispatches them. Feature requests run
//! on their own tasks so that a slow handler never delays other requests or
//! cancellation; their outcomes come back to the loop, which alone owns the
//! table of pending requests and therefore decides whether a response is
//! still wanted.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::{ Map, Value, json };
use tokio::sync::{ mpsc, watch };
use tokio::task::{ AbortHandle, JoinHandle };
use tracing::{ debug, error, info, warn };

use crate::errors::{ Error, error_codes };
use crate::lifecycle::{ Lifecycle, SessionState };
use crate::messages::{ Message, Notification, Request, RequestId, Response, methods, parse_params };
use crate::registry::{ Registry, ToolHandler };
use crate::transport::Transport;
use crate::types::{
    CallToolParams,
    CallToolResult,
    CancelledParams,
    ClientCapabilities,
    GetPromptParams,
    Implementation,
    InitializeRequestParams,
    InitializeResult,
    ListPromptsResult,
    ListResourceTemplatesResult,
    ListResourcesResult,
    ListToolsResult,
    ReadResourceParams,
    ToolError,
    negotiate_version,
};

use super::server::ServerConfig;

/// What was agreed during the handshake
#[derive(Debug, Clone)]
pub struct NegotiatedSession {
    pub protocol_version: String,
    pub client_capabilities: ClientCapabilities,
    pub client_info: Option<Implementation>,
}

/// Outcome of a request that ran on its own task
struct Completion {
    id: RequestId,
    /// Which spawn produced it; a reused id gets a new one
    seq: u64,
    outcome: Result<Value, Error>,
}

/// A spawned request still owed a response
struct InFlight {
    seq: u64,
    handle: AbortHandle,
}

enum Flow {
    Continue,
    Shutdown,
}

/// State of one server-side connection
pub struct ServerSession {
    id: String,
    transport: Arc<dyn Transport>,
    registry: Arc<Registry>,
    config: Arc<ServerConfig>,
    lifecycle: Lifecycle,
    negotiated: Option<NegotiatedSession>,
    /// Requests whose handlers are still running
    pending: HashMap<RequestId, InFlight>,
    next_seq: u64,
}

impl ServerSession {
    pub fn new(
        id: impl Into<String>,
        transport: Arc<dyn Transport>,
        registry: Arc<Registry>,
        config: Arc<ServerConfig>
    ) -> Self {
        let id = id.into();
        Self {
            lifecycle: Lifecycle::new(format!("session {}", id)),
            id,
            transport,
            registry,
            config,
            negotiated: None,
            pending: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Observe lifecycle changes; useful for tests and supervisors
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.lifecycle.subscribe()
    }

    /// Serve the connection until the peer leaves, asks to shut down, or the
    /// transport fails. Returns an error only for fatal conditions.
    pub async fn run(mut self) -> Result<(), Error> {
        info!("Session {} started", self.id);
        self.lifecycle.transition(SessionState::Initializing)?;

        let (incoming_tx, mut incoming_rx) = mpsc::channel(64);
        let reader = tokio::spawn(read_incoming(Arc::clone(&self.transport), incoming_tx));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();

        let outcome = loop {
            tokio::select! {
                Some(done) = done_rx.recv() => {
                    if let Err(e) = self.complete(done).await {
                        break Err(e);
                    }
                }
                incoming = incoming_rx.recv() => {
                    match incoming {
                        Some(Ok(message)) => {
                            match self.handle_message(message, &done_tx).await {
                                Ok(Flow::Continue) => {}
                                Ok(Flow::Shutdown) => break Ok(()),
                                Err(e) => break Err(e),
                            }
                        }
                        Some(Err(Error::MalformedMessage { id: Some(id), reason })) => {
                            let error = Error::MalformedMessage { id: Some(id.clone()), reason };
                            if let Err(e) = self.respond_error(id, &error).await {
                                break Err(e);
                            }
                        }
                        Some(Err(e)) => {
                            error!("Session {} failed: {}", self.id, e);
                            break Err(e);
                        }
                        None => {
                            debug!("Session {}: peer closed the connection", self.id);
                            break Ok(());
                        }
                    }
                }
            }
        };

        self.finish(reader).await;
        outcome
    }

    async fn handle_message(
        &mut self,
        message: Message,
        done: &mpsc::UnboundedSender<Completion>
    ) -> Result<Flow, Error> {
        match message {
            Message::Request(request) => self.handle_request(request, done).await,
            Message::Notification(notification) => {
                self.handle_notification(notification);
                Ok(Flow::Continue)
            }
            Message::Response(response) => {
                warn!("Session {}: ignoring unsolicited response {}", self.id, response.id);
                Ok(Flow::Continue)
            }
        }
    }

    async fn handle_request(
        &mut self,
        request: Request,
        done: &mpsc::UnboundedSender<Completion>
    ) -> Result<Flow, Error> {
        let Request { id, method, params, .. } = request;
        debug!("Session {}: request {} {}", self.id, id, method);

        if self.pending.contains_key(&id) {
            let error = Error::Protocol(format!("Request id {} is already in flight", id));
            self.respond_error(id, &error).await?;
            return Ok(Flow::Continue);
        }

        match method.as_str() {
            methods::INITIALIZE => {
                return self.handle_initialize(id, params).await;
            }
            methods::PING => {
                self.respond(id, json!({})).await?;
                return Ok(Flow::Continue);
            }
            methods::SHUTDOWN => {
                info!("Session {}: shutdown requested", self.id);
                self.respond(id, json!({})).await?;
                return Ok(Flow::Shutdown);
            }
            _ => {}
        }

        if self.lifecycle.current() != SessionState::Ready {
            let error = Error::InvalidState(format!("Server not initialized, cannot serve {}", method));
            self.respond_error(id, &error).await?;
            return Ok(Flow::Continue);
        }

        match self.dispatch(id.clone(), &method, params, done) {
            Ok(Some(result)) => self.respond(id, result).await?,
            Ok(None) => {}
            Err(e) => self.respond_error(id, &e).await?,
        }
        Ok(Flow::Continue)
    }

    /// Route a feature request. Listing answers inline; everything that runs
    /// user code is spawned and answers later through the completion channel.
    fn dispatch(
        &mut self,
        id: RequestId,
        method: &str,
        params: Option<Value>,
        done: &mpsc::UnboundedSender<Completion>
    ) -> Result<Option<Value>, Error> {
        match method {
            methods::TOOLS_LIST => {
                let result = ListToolsResult {
                    tools: self.registry
                        .list_tools()
                        .map(|t| t.to_tool())
                        .collect(),
                    next_cursor: None,
                };
                Ok(Some(serde_json::to_value(result)?))
            }
            methods::TOOLS_CALL => {
                let params: CallToolParams = parse_params(params)?;
                let tool = self.registry.get_tool(&params.name)?;
                let arguments = params.arguments.unwrap_or_default();
                tool.parameters.validate(&arguments)?;

                let handler = tool.handler();
                let timeout = self.config.tool_timeout;
                let session = self.id.clone();
                let name = params.name;
                self.spawn_request(id, done, async move {
                    let result = match run_tool(handler, arguments, timeout).await {
                        Ok(value) => CallToolResult::success(value),
                        Err(e) => {
                            warn!("Session {}: tool {} failed: {}", session, name, e);
                            CallToolResult::failure(e)
                        }
                    };
                    Ok(serde_json::to_value(result)?)
                });
                Ok(None)
            }
            methods::RESOURCES_LIST => {
                let result = ListResourcesResult {
                    resources: self.registry
                        .list_resources()
                        .map(|r| r.to_resource())
                        .collect(),
                    next_cursor: None,
                };
                Ok(Some(serde_json::to_value(result)?))
            }
            methods::RESOURCES_TEMPLATES_LIST => {
                let result = ListResourceTemplatesResult {
                    resource_templates: self.registry
                        .list_resource_templates()
                        .map(|t| t.to_template())
                        .collect(),
                    next_cursor: None,
                };
                Ok(Some(serde_json::to_value(result)?))
            }
            methods::RESOURCES_READ => {
                let params: ReadResourceParams = parse_params(params)?;
                let registry = Arc::clone(&self.registry);
                self.spawn_request(id, done, async move {
                    let result = registry.read_resource(&params.uri).await?;
                    Ok(serde_json::to_value(result)?)
                });
                Ok(None)
            }
            methods::PROMPTS_LIST => {
                let result = ListPromptsResult {
                    prompts: self.registry
                        .list_prompts()
                        .map(|p| p.to_prompt())
                        .collect(),
                    next_cursor: None,
                };
                Ok(Some(serde_json::to_value(result)?))
            }
            methods::PROMPTS_GET => {
                let params: GetPromptParams = parse_params(params)?;
                // Fail fast on unknown prompts without spawning
                self.registry.get_prompt(&params.name)?;
                let registry = Arc::clone(&self.registry);
                self.spawn_request(id, done, async move {
                    let arguments = params.arguments.unwrap_or_default();
                    let result = registry.render_prompt(&params.name, &arguments).await?;
                    Ok(serde_json::to_value(result)?)
                });
                Ok(None)
            }
            other => Err(Error::MethodNotFound(other.to_string())),
        }
    }

    async fn handle_initialize(&mut self, id: RequestId, params: Option<Value>) -> Result<Flow, Error> {
        if self.negotiated.is_some() || self.lifecycle.current() != SessionState::Initializing {
            let error = Error::Protocol("Session is already initialized".to_string());
            self.respond_error(id, &error).await?;
            return Ok(Flow::Continue);
        }

        let params: InitializeRequestParams = match parse_params(params) {
            Ok(params) => params,
            Err(e) => {
                self.respond_error(id, &e).await?;
                return Ok(Flow::Continue);
            }
        };

        let version = match negotiate_version(&params.protocol_version) {
            Ok(version) => version,
            Err(e) => {
                // Nothing in common; tell the client why, then hang up
                warn!("Session {}: {}", self.id, e);
                let mut data = e.to_error_data();
                data.data = Some(
                    json!({
                    "requested": params.protocol_version,
                    "supported": crate::types::SUPPORTED_PROTOCOL_VERSIONS,
                })
                );
                self.send(Message::Response(Response::error(id, data))).await?;
                return Err(e);
            }
        };

        let mut capabilities = self.registry.capabilities();
        capabilities.experimental = self.config.experimental.clone();
        let result = InitializeResult {
            protocol_version: version.to_string(),
            capabilities: capabilities.negotiate(&params.capabilities),
            server_info: Implementation::new(&self.config.name, &self.config.version),
            instructions: self.config.instructions.clone(),
        };

        info!(
            "Session {}: negotiated protocol {} with {}",
            self.id,
            version,
            params.client_info.as_ref().map_or("unknown client", |c| c.name.as_str())
        );

        self.negotiated = Some(NegotiatedSession {
            protocol_version: version.to_string(),
            client_capabilities: params.capabilities,
            client_info: params.client_info,
        });
        self.respond(id, serde_json::to_value(result)?).await?;

        if !self.config.require_initialized_notification {
            self.lifecycle.transition(SessionState::Ready)?;
        }
        Ok(Flow::Continue)
    }

    fn handle_notification(&mut self, notification: Notification) {
        match notification.method.as_str() {
            methods::INITIALIZED => {
                if self.negotiated.is_none() {
                    warn!("Session {}: initialized notification before initialize", self.id);
                } else if self.lifecycle.current() == SessionState::Initializing {
                    if let Err(e) = self.lifecycle.transition(SessionState::Ready) {
                        warn!("Session {}: {}", self.id, e);
                    }
                }
            }
            methods::CANCELLED => {
                match parse_params::<CancelledParams>(notification.params) {
                    Ok(params) => self.cancel(&params.request_id, params.reason.as_deref()),
                    Err(e) => warn!("Session {}: bad cancellation: {}", self.id, e),
                }
            }
            other => debug!("Session {}: ignoring notification {}", self.id, other),
        }
    }

    fn cancel(&mut self, id: &RequestId, reason: Option<&str>) {
        match self.pending.remove(id) {
            Some(in_flight) => {
                in_flight.handle.abort();
                info!("Session {}: cancelled request {} ({})", self.id, id, reason.unwrap_or("no reason"));
            }
            None => debug!("Session {}: nothing to cancel for {}", self.id, id),
        }
    }

    fn spawn_request<F>(&mut self, id: RequestId, done: &mpsc::UnboundedSender<Completion>, work: F)
        where F: Future<Output = Result<Value, Error>> + Send + 'static
    {
        let done = done.clone();
        let task_id = id.clone();
        let seq = self.next_seq;
        self.next_seq += 1;
        let handle: JoinHandle<()> = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(work)
                .catch_unwind().await
                .unwrap_or_else(|panic| Err(Error::Other(format!("Handler panicked: {}", panic_message(&*panic)))));
            let _ = done.send(Completion { id: task_id, seq, outcome });
        });
        self.pending.insert(id, InFlight { seq, handle: handle.abort_handle() });
    }

    async fn complete(&mut self, done: Completion) -> Result<(), Error> {
        // Only the spawn that currently owns the id may answer it
        let current = self.pending.get(&done.id).is_some_and(|in_flight| in_flight.seq == done.seq);
        if !current {
            debug!("Session {}: dropping result of cancelled request {}", self.id, done.id);
            return Ok(());
        }
        self.pending.remove(&done.id);
        match done.outcome {
            Ok(result) => self.respond(done.id, result).await,
            Err(e) => self.respond_error(done.id, &e).await,
        }
    }

    async fn respond(&self, id: RequestId, result: Value) -> Result<(), Error> {
        self.send(Message::Response(Response::success(id, result))).await
    }

    async fn respond_error(&self, id: RequestId, error: &Error) -> Result<(), Error> {
        debug!("Session {}: request {} failed: {}", self.id, id, error);
        self.send(Message::Response(Response::error(id, error.to_error_data()))).await
    }

    async fn send(&self, message: Message) -> Result<(), Error> {
        self.transport.send(&message).await
    }

    async fn finish(&mut self, reader: JoinHandle<()>) {
        if self.lifecycle.current().can_transition_to(SessionState::Closing) {
            let _ = self.lifecycle.transition(SessionState::Closing);
        }

        for (id, in_flight) in self.pending.drain() {
            debug!("Session {}: abandoning request {}", self.id, id);
            in_flight.handle.abort();
        }
        reader.abort();

        if let Err(e) = self.transport.close().await {
            debug!("Session {}: error closing transport: {}", self.id, e);
        }
        self.lifecycle.close();
        info!("Session {} closed", self.id);
    }
}

/// Pump frames from the transport into the session loop
async fn read_incoming(transport: Arc<dyn Transport>, incoming: mpsc::Sender<Result<Message, Error>>) {
    loop {
        let next = match transport.receive().await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => {
                break;
            }
            Err(e) => Err(e),
        };
        let fatal = matches!(&next, Err(e) if !matches!(e, Error::MalformedMessage { id: Some(_), .. }));
        if incoming.send(next).await.is_err() || fatal {
            break;
        }
    }
}

/// Run a tool handler, turning panics and overruns into tool failures
async fn run_tool(
    handler: Arc<dyn ToolHandler>,
    arguments: Map<String, Value>,
    timeout: Option<Duration>
) -> Result<Value, ToolError> {
    let call = AssertUnwindSafe(handler.call(arguments)).catch_unwind();
    let outcome = match timeout {
        Some(limit) =>
            tokio::time::timeout(limit, call).await.map_err(|_| {
                ToolError::new(error_codes::REQUEST_TIMEOUT as i64, format!("Tool timed out after {:?}", limit))
            })?,
        None => call.await,
    };
    outcome.unwrap_or_else(|panic| Err(ToolError::internal(format!("Tool panicked: {}", panic_message(&*panic)))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
