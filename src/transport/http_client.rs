//! Streamable HTTP client transport
//!
//! Every outgoing message is one POST. The first response carrying an
//! `Mcp-Session-Id` header fixes the session; from then on the header is
//! attached to every request and, when enabled, a GET stream is opened so the
//! server can push messages over SSE. Inline JSON replies and SSE events land
//! in the same inbound queue.

use std::sync::{ Mutex, PoisonError };
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{ Client as HttpClient, StatusCode, header::{ ACCEPT, CONTENT_TYPE } };
use tokio::sync::{ Mutex as AsyncMutex, mpsc };
use tokio::task::JoinHandle;
use tokio_util::codec::{ FramedRead, LinesCodec };
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{ debug, info, warn };

use crate::codec;
use crate::errors::Error;
use crate::messages::Message;

use super::Transport;
use super::http_server::SESSION_HEADER;

/// Default timeout for a single POST
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for establishing a TCP connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for the HTTP client transport
#[derive(Debug, Clone)]
pub struct HttpClientOptions {
    /// Full URL of the server endpoint, e.g. `http://127.0.0.1:8000/mcp`
    pub url: String,
    /// Timeout for each POST round trip
    pub request_timeout: Duration,
    /// Open the SSE stream once the session id is known
    pub open_stream: bool,
}

impl HttpClientOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            open_stream: true,
        }
    }
}

/// Client side of the streamable HTTP transport
pub struct HttpClientTransport {
    http: HttpClient,
    options: HttpClientOptions,
    session_id: Mutex<Option<String>>,
    inbound_tx: mpsc::UnboundedSender<Message>,
    inbound_rx: AsyncMutex<mpsc::UnboundedReceiver<Message>>,
    stream_task: Mutex<Option<JoinHandle<()>>>,
    closed: CancellationToken,
}

impl HttpClientTransport {
    pub fn new(options: HttpClientOptions) -> Result<Self, Error> {
        url::Url
            ::parse(&options.url)
            .map_err(|e| Error::Transport(format!("Invalid server URL {}: {}", options.url, e)))?;

        // No overall timeout here; it would cut the SSE stream
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Ok(Self {
            http,
            options,
            session_id: Mutex::new(None),
            inbound_tx,
            inbound_rx: AsyncMutex::new(inbound_rx),
            stream_task: Mutex::new(None),
            closed: CancellationToken::new(),
        })
    }

    /// Session id assigned by the server, once known
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn adopt_session(&self, id: &str) {
        {
            let mut session_id = self.session_id.lock().unwrap_or_else(PoisonError::into_inner);
            if session_id.is_some() {
                return;
            }
            *session_id = Some(id.to_string());
        }
        info!("Joined HTTP session {}", id);
        if self.options.open_stream {
            self.open_stream(id);
        }
    }

    fn open_stream(&self, session_id: &str) {
        let request = self.http
            .get(&self.options.url)
            .header(ACCEPT, "text/event-stream")
            .header(SESSION_HEADER, session_id);
        let inbound = self.inbound_tx.clone();
        let closed = self.closed.clone();

        let task = tokio::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("SSE stream opened");
                    pump_stream(response, inbound, closed).await;
                }
                Ok(response) => {
                    warn!("Server refused SSE stream with status {}", response.status());
                }
                Err(e) => {
                    warn!("Failed to open SSE stream: {}", e);
                }
            }
        });

        *self.stream_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }
}

/// Forward SSE events into the inbound queue until the stream ends
async fn pump_stream(
    response: reqwest::Response,
    inbound: mpsc::UnboundedSender<Message>,
    closed: CancellationToken
) {
    let body = response.bytes_stream().map(|chunk| chunk.map_err(std::io::Error::other));
    let mut lines = FramedRead::new(StreamReader::new(body), LinesCodec::new());
    let mut parser = SseEventParser::default();

    loop {
        tokio::select! {
            _ = closed.cancelled() => return,
            line = lines.next() => {
                match line {
                    Some(Ok(line)) => {
                        let Some(event) = parser.feed(&line) else {
                            continue;
                        };
                        if event.event.as_deref().is_some_and(|name| name != "message") {
                            debug!("Ignoring SSE event {:?}", event.event);
                            continue;
                        }
                        match codec::decode(event.data.as_bytes()) {
                            Ok(message) => {
                                if inbound.send(message).is_err() {
                                    return;
                                }
                            }
                            Err(e) => warn!("Dropping undecodable SSE event: {}", e),
                        }
                    }
                    Some(Err(e)) => {
                        warn!("SSE stream failed: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // The server ends the stream only when the session is gone
    info!("SSE stream closed by server");
    closed.cancel();
}

#[async_trait]
impl Transport for HttpClientTransport {
    async fn send(&self, message: &Message) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::Transport("Transport is closed".to_string()));
        }

        let mut request = self.http
            .post(&self.options.url)
            .timeout(self.options.request_timeout)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(message);
        if let Some(id) = self.session_id() {
            request = request.header(SESSION_HEADER, id);
        }

        let response = request
            .send().await
            .map_err(|e| Error::Transport(format!("POST to {} failed: {}", self.options.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
                self.closed.cancel();
            }
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("Server rejected message with status {}: {}", status, body)));
        }

        if
            let Some(id) = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
        {
            self.adopt_session(id);
        }

        if status == StatusCode::ACCEPTED {
            return Ok(());
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        let body = response
            .bytes().await
            .map_err(|e| Error::Transport(format!("Failed to read response body: {}", e)))?;
        if body.is_empty() || !is_json {
            return Ok(());
        }

        let reply = codec::decode(&body)?;
        self.inbound_tx
            .send(reply)
            .map_err(|_| Error::Transport("Inbound queue closed".to_string()))
    }

    async fn receive(&self) -> Result<Option<Message>, Error> {
        let mut inbound = self.inbound_rx.lock().await;
        tokio::select! {
            biased;
            message = inbound.recv() => Ok(message),
            _ = self.closed.cancelled() => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), Error> {
        if self.closed.is_cancelled() {
            return Ok(());
        }

        if let Some(id) = self.session_id() {
            let result = self.http
                .delete(&self.options.url)
                .timeout(self.options.request_timeout)
                .header(SESSION_HEADER, &id)
                .send().await;
            match result {
                Ok(response) => debug!("DELETE session {} returned {}", id, response.status()),
                Err(e) => warn!("Failed to end session {}: {}", id, e),
            }
        }

        self.closed.cancel();
        if let Some(task) = self.stream_task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.is_cancelled()
    }
}

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Line-oriented SSE parser; a blank line dispatches the buffered event
#[derive(Debug, Default)]
pub(crate) struct SseEventParser {
    event: Option<String>,
    data: Vec<String>,
}

impl SseEventParser {
    pub(crate) fn feed(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            let event = self.event.take();
            if self.data.is_empty() {
                return None;
            }
            let data = std::mem::take(&mut self.data).join("\n");
            return Some(SseEvent { event, data });
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => {
                self.event = Some(value.to_string());
            }
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }
}
