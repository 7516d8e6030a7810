//! Streamable HTTP server transport
//!
//! A single endpoint (default `/mcp`) carries every session:
//! - `POST` with an `initialize` request opens a session and returns its id in
//!   the `Mcp-Session-Id` header. Other POSTs must carry that header.
//! - A POSTed request is answered in the HTTP response body, unless the client
//!   holds an SSE stream, in which case the POST is acknowledged with `202` and
//!   the response travels over the stream. Notifications always get `202`.
//! - `GET` attaches the session's SSE stream; dropping it ends the session.
//! - `DELETE` ends the session.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, Mutex, PoisonError, RwLock };
use std::time::Duration;

use axum::{
    Json,
    Router,
    body::Bytes,
    extract::State,
    http::{ HeaderMap, HeaderName, StatusCode },
    response::{ IntoResponse, Response as HttpResponse, Sse, sse::{ Event, KeepAlive } },
    routing::post,
};
use http::Method;
use scopeguard::ScopeGuard;
use tokio::sync::{ mpsc, oneshot };
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{ Any, CorsLayer };
use tracing::{ debug, info, warn };

use crate::codec;
use crate::errors::Error;
use crate::messages::{ Message, RequestId, methods };
use crate::server::Server;

use super::ChannelTransport;

/// Header carrying the session id
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Configuration options for the HTTP server
#[derive(Debug, Clone)]
pub struct HttpServerOptions {
    /// Address to bind the server to; port 0 picks a free port
    pub bind_address: String,
    /// Path of the protocol endpoint
    pub endpoint: String,
    /// How long a POSTed request may wait for its inline response
    pub request_timeout: Duration,
    /// Interval between SSE keep-alive comments
    pub keep_alive: Duration,
    /// Capacity of each session's inbound and outbound queues
    pub channel_capacity: usize,
}

impl Default for HttpServerOptions {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            endpoint: "/mcp".to_string(),
            request_timeout: Duration::from_secs(120),
            keep_alive: Duration::from_secs(15),
            channel_capacity: 64,
        }
    }
}

/// Removes a POST's waiter however the handler exits
type WaiterGuard = ScopeGuard<(Arc<HttpSession>, RequestId), fn((Arc<HttpSession>, RequestId))>;

fn release_waiter((session, id): (Arc<HttpSession>, RequestId)) {
    session.remove_waiter(&id);
}

/// HTTP-side view of one session
struct HttpSession {
    id: String,
    /// Feeds the session's transport
    inbound: mpsc::Sender<Message>,
    /// POSTs waiting for the response to their request
    waiters: Mutex<HashMap<RequestId, oneshot::Sender<Message>>>,
    /// Outbound traffic not claimed by a waiter, until a GET takes it
    stream: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    stream_attached: AtomicBool,
    /// Shared with the session's transport; cancelling it ends the session
    closed: CancellationToken,
}

impl HttpSession {
    fn route(&self, message: Message, stream: &mpsc::UnboundedSender<Message>) {
        if let Message::Response(response) = &message {
            let waiter = self.waiters.lock().unwrap_or_else(PoisonError::into_inner).remove(&response.id);
            if let Some(waiter) = waiter {
                let _ = waiter.send(message);
                return;
            }
        }
        if stream.send(message).is_err() {
            debug!("Session {}: stream receiver gone, dropping message", self.id);
        }
    }

    /// Wait for the response to `id`; dropping the guard forgets the waiter
    fn add_waiter(self: &Arc<Self>, id: RequestId) -> (oneshot::Receiver<Message>, WaiterGuard) {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner).insert(id.clone(), tx);
        let guard = scopeguard::guard((Arc::clone(self), id), release_waiter as fn((Arc<HttpSession>, RequestId)));
        (rx, guard)
    }

    fn remove_waiter(&self, id: &RequestId) {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner).remove(id);
    }

    fn take_stream(&self) -> Option<mpsc::UnboundedReceiver<Message>> {
        let stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner).take();
        if stream.is_some() {
            self.stream_attached.store(true, Ordering::SeqCst);
        }
        stream
    }

    fn has_stream(&self) -> bool {
        self.stream_attached.load(Ordering::SeqCst)
    }

    /// End the session; outstanding POSTs are released with an error
    fn close(&self) {
        self.closed.cancel();
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Application state for the HTTP server
struct HttpState {
    server: Server,
    options: HttpServerOptions,
    sessions: RwLock<HashMap<String, Arc<HttpSession>>>,
}

impl HttpState {
    fn session(&self, id: &str) -> Option<Arc<HttpSession>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).get(id).cloned()
    }

    fn remove_session(&self, id: &str) -> Option<Arc<HttpSession>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner).remove(id)
    }

    fn close_all(&self) {
        let sessions: Vec<_> = self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, session)| session)
            .collect();
        for session in sessions {
            session.close();
        }
    }

    /// Start a new protocol session and the task routing its output
    fn open_session(self: &Arc<Self>) -> Arc<HttpSession> {
        let closed = CancellationToken::new();
        let (transport, peer) = ChannelTransport::pair(self.options.channel_capacity, closed.clone());
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();
        let session = self.server.session(Arc::new(transport));

        let http_session = Arc::new(HttpSession {
            id: session.id().to_string(),
            inbound: peer.inbound,
            waiters: Mutex::new(HashMap::new()),
            stream: Mutex::new(Some(stream_rx)),
            stream_attached: AtomicBool::new(false),
            closed,
        });
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(http_session.id.clone(), Arc::clone(&http_session));
        info!("Opened HTTP session {}", http_session.id);

        let id = http_session.id.clone();
        tokio::spawn(async move {
            if let Err(e) = session.run().await {
                warn!("HTTP session {} ended with error: {}", id, e);
            }
        });

        // Route until the session drops its transport, then clean up
        let state = Arc::clone(self);
        let router = Arc::clone(&http_session);
        let mut outbound = peer.outbound;
        tokio::spawn(async move {
            while let Some(message) = outbound.recv().await {
                router.route(message, &stream_tx);
            }
            state.remove_session(&router.id);
            router.close();
            debug!("HTTP session {} cleaned up", router.id);
        });

        http_session
    }
}

/// Handle for a running HTTP server, used for shutdown
pub struct HttpServerHandle {
    local_addr: SocketAddr,
    endpoint: String,
    shutdown: CancellationToken,
    state: Arc<HttpState>,
    task: JoinHandle<Result<(), Error>>,
}

impl HttpServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Full URL of the protocol endpoint
    pub fn url(&self) -> String {
        format!("http://{}{}", self.local_addr, self.endpoint)
    }

    pub fn session_count(&self) -> usize {
        self.state.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Stop accepting connections and end every session
    pub async fn shutdown(self) -> Result<(), Error> {
        info!("Shutting down HTTP server on {}", self.local_addr);
        self.shutdown.cancel();
        self.state.close_all();

        match tokio::time::timeout(Duration::from_secs(5), self.task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::Transport(format!("HTTP server task failed: {}", e))),
            Err(_) => {
                warn!("HTTP server did not stop within 5 seconds");
                Ok(())
            }
        }
    }
}

/// Bind the listener and start serving in the background
pub(crate) async fn serve(server: Server, options: HttpServerOptions) -> Result<HttpServerHandle, Error> {
    let listener = tokio::net::TcpListener
        ::bind(&options.bind_address).await
        .map_err(|e| Error::Transport(format!("Failed to bind to {}: {}", options.bind_address, e)))?;
    let local_addr = listener.local_addr()?;

    let state = Arc::new(HttpState {
        server,
        options: options.clone(),
        sessions: RwLock::new(HashMap::new()),
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any)
        .expose_headers([HeaderName::from_static(SESSION_HEADER)]);

    let app = Router::new()
        .route(&options.endpoint, post(handle_post).get(handle_get).delete(handle_delete))
        .layer(cors)
        .with_state(Arc::clone(&state));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await
            .map_err(|e| Error::Transport(format!("HTTP server error: {}", e)))
    });

    info!("Listening on http://{}{}", local_addr, options.endpoint);

    Ok(HttpServerHandle {
        local_addr,
        endpoint: options.endpoint,
        shutdown,
        state,
        task,
    })
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn with_session(id: &str, response: impl IntoResponse) -> HttpResponse {
    ([(HeaderName::from_static(SESSION_HEADER), id.to_string())], response).into_response()
}

/// Handle a message from a client
async fn handle_post(State(state): State<Arc<HttpState>>, headers: HeaderMap, body: Bytes) -> HttpResponse {
    let message = match codec::decode(&body) {
        Ok(message) => message,
        Err(e) => {
            warn!("Rejecting POST body: {}", e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let session = match session_id(&headers) {
        Some(id) =>
            match state.session(&id) {
                Some(session) => session,
                None => {
                    return (StatusCode::NOT_FOUND, "Unknown session").into_response();
                }
            }
        None if message.method() == Some(methods::INITIALIZE) => state.open_session(),
        None => {
            return (StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header").into_response();
        }
    };

    match message {
        Message::Request(request) if !session.has_stream() => {
            // Axum drops this future when the client disconnects; the guard still runs
            let (waiter, _registration) = session.add_waiter(request.id.clone());
            if session.inbound.send(Message::Request(request)).await.is_err() {
                return (StatusCode::GONE, "Session closed").into_response();
            }

            match tokio::time::timeout(state.options.request_timeout, waiter).await {
                Ok(Ok(response)) => with_session(&session.id, Json(response)),
                Ok(Err(_)) => (StatusCode::GONE, "Session closed").into_response(),
                Err(_) => (StatusCode::GATEWAY_TIMEOUT, "Timed out waiting for response").into_response(),
            }
        }
        other => {
            if session.inbound.send(other).await.is_err() {
                return (StatusCode::GONE, "Session closed").into_response();
            }
            with_session(&session.id, StatusCode::ACCEPTED)
        }
    }
}

/// Attach the SSE stream for server-to-client messages
async fn handle_get(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> HttpResponse {
    let Some(id) = session_id(&headers) else {
        return (StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header").into_response();
    };
    let Some(session) = state.session(&id) else {
        return (StatusCode::NOT_FOUND, "Unknown session").into_response();
    };
    let Some(mut messages) = session.take_stream() else {
        return (StatusCode::CONFLICT, "Stream already attached").into_response();
    };

    info!("SSE stream attached to session {}", id);

    let stream =
        async_stream::stream! {
        // Losing the stream ends the session
        let session = scopeguard::guard(session, |session| {
            debug!("SSE stream for session {} dropped", session.id);
            session.close();
        });

        loop {
            tokio::select! {
                message = messages.recv() => {
                    match message {
                        Some(message) => {
                            match serde_json::to_string(&message) {
                                Ok(data) => yield Ok::<_, Infallible>(Event::default().event("message").data(data)),
                                Err(e) => warn!("Failed to serialize message for session {}: {}", session.id, e),
                            }
                        }
                        None => break,
                    }
                }
                _ = session.closed.cancelled() => break,
            }
        }
    };

    with_session(&id, Sse::new(stream).keep_alive(KeepAlive::new().interval(state.options.keep_alive)))
}

/// Terminate a session
async fn handle_delete(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> HttpResponse {
    let Some(id) = session_id(&headers) else {
        return (StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header").into_response();
    };
    match state.remove_session(&id) {
        Some(session) => {
            info!("Session {} terminated by client", id);
            session.close();
            StatusCode::NO_CONTENT.into_response()
        }
        None => (StatusCode::NOT_FOUND, "Unknown session").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Response;
    use serde_json::json;

    fn http_session() -> Arc<HttpSession> {
        let (inbound, _) = mpsc::channel(1);
        Arc::new(HttpSession {
            id: "s-1".to_string(),
            inbound,
            waiters: Mutex::new(HashMap::new()),
            stream: Mutex::new(None),
            stream_attached: AtomicBool::new(false),
            closed: CancellationToken::new(),
        })
    }

    fn waiting(session: &HttpSession) -> usize {
        session.waiters.lock().unwrap().len()
    }

    #[test]
    fn test_abandoned_post_releases_its_waiter() {
        let session = http_session();
        let (waiter, registration) = session.add_waiter(RequestId::Number(1));
        assert_eq!(waiting(&session), 1);

        // The handler future is dropped before any response arrives
        drop(waiter);
        drop(registration);
        assert_eq!(waiting(&session), 0);
    }

    #[tokio::test]
    async fn test_response_reaches_its_waiter() {
        let session = http_session();
        let (stream_tx, mut stream_rx) = mpsc::unbounded_channel();
        let (waiter, _registration) = session.add_waiter(RequestId::Number(2));

        let response = Message::Response(Response::success(RequestId::Number(2), json!({})));
        session.route(response.clone(), &stream_tx);
        assert_eq!(waiter.await.unwrap(), response);
        assert_eq!(waiting(&session), 0);

        // Nobody waits for this one, so it goes to the stream
        let unclaimed = Message::Response(Response::success(RequestId::Number(3), json!({})));
        session.route(unclaimed.clone(), &stream_tx);
        assert_eq!(stream_rx.recv().await, Some(unclaimed));
    }
}
