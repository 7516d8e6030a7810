//! Message Types
//!
//! This module defines the JSON-RPC 2.0 envelopes exchanged between peers:
//! requests, responses and notifications. Incoming JSON is classified by hand
//! rather than through an untagged derive so that a malformed frame can still
//! report the request id it carried.

use std::fmt;

use serde::{ Deserialize, Deserializer, Serialize };
use serde_json::{ Map, Value };

use crate::errors::Error;

/// The only JSON-RPC version this library speaks
pub const JSONRPC_VERSION: &str = "2.0";

/// Method names used by the protocol
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const CANCELLED: &str = "notifications/cancelled";
    pub const PING: &str = "ping";
    pub const SHUTDOWN: &str = "shutdown";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";
}

/// Request identifier, either a number or a string
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    /// Parse an id from its JSON form, rejecting anything but integers and strings
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RequestId::Number),
            Value::String(s) => Some(RequestId::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId::String(value.to_string())
    }
}

/// Keeps an explicit `null` as `Some(Value::Null)` while a missing field stays `None`
pub(crate) fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error> where D: Deserializer<'de> {
    Value::deserialize(deserializer).map(Some)
}

/// Request expecting exactly one response
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Request {
    /// JSON-RPC version, always "2.0"
    pub jsonrpc: String,
    /// Request ID
    pub id: RequestId,
    /// Method name (e.g., "initialize")
    pub method: String,
    /// Parameters, parsed into a typed form by the dispatcher
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Response for a JSON-RPC request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Response {
    /// JSON-RPC version, always "2.0"
    pub jsonrpc: String,
    /// ID from the request
    pub id: RequestId,
    /// Either a result or an error
    #[serde(flatten)]
    pub outcome: ResponseOutcome,
}

/// Represents either a successful result or an error
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ResponseOutcome {
    /// Success case with a result
    Success {
        result: Value,
    },
    /// Error case with error details
    Error {
        error: ErrorData,
    },
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: ResponseOutcome::Success { result },
        }
    }

    pub fn error(id: RequestId, error: ErrorData) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: ResponseOutcome::Error { error },
        }
    }

    /// Turn the outcome into a result, mapping error payloads to typed errors
    pub fn into_result(self) -> Result<Value, Error> {
        match self.outcome {
            ResponseOutcome::Success { result } => Ok(result),
            ResponseOutcome::Error { error } => Err(Error::from_error_data(error)),
        }
    }
}

/// Error information for failed requests
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorData {
    /// Error code (e.g., -32600 for Invalid Request)
    pub code: i32,
    /// Human-readable error message
    pub message: String,
    /// Optional additional data
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Notification is a request without an expected response
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notification {
    /// JSON-RPC version, always "2.0"
    pub jsonrpc: String,
    /// Method name (e.g., "notifications/initialized")
    pub method: String,
    /// Optional parameters for the notification
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// The top-level Message enum for handling JSON-RPC 2.0 messages
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl Message {
    /// The request id, for requests and responses
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Message::Request(r) => Some(&r.id),
            Message::Response(r) => Some(&r.id),
            Message::Notification(_) => None,
        }
    }

    /// The method name, for requests and notifications
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(r) => Some(&r.method),
            Message::Notification(n) => Some(&n.method),
            Message::Response(_) => None,
        }
    }

    /// Classify a parsed JSON value as a request, response or notification
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let Value::Object(mut object) = value else {
            return Err(malformed(None, "message is not a JSON object"));
        };

        // Recover the id first so later failures can still be answered
        let id = match object.get("id") {
            None | Some(Value::Null) => None,
            Some(raw) =>
                match RequestId::from_value(raw) {
                    Some(id) => Some(id),
                    None => {
                        return Err(malformed(None, "id must be an integer or a string"));
                    }
                }
        };

        match object.get("jsonrpc") {
            Some(Value::String(v)) if v == JSONRPC_VERSION => {}
            Some(_) => {
                return Err(malformed(id, "unsupported jsonrpc version"));
            }
            None => {
                return Err(malformed(id, "missing jsonrpc field"));
            }
        }

        let has_result = object.contains_key("result");
        let has_error = object.contains_key("error");

        if has_result && has_error {
            return Err(malformed(id, "response carries both result and error"));
        }

        if has_result || has_error {
            let Some(id) = id else {
                return Err(malformed(None, "response without id"));
            };
            let outcome = if has_result {
                ResponseOutcome::Success {
                    result: object.remove("result").unwrap_or(Value::Null),
                }
            } else {
                let error = object.remove("error").unwrap_or(Value::Null);
                match serde_json::from_value::<ErrorData>(error) {
                    Ok(error) => ResponseOutcome::Error { error },
                    Err(e) => {
                        return Err(malformed(Some(id), format!("invalid error object: {}", e)));
                    }
                }
            };
            return Ok(
                Message::Response(Response {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    id,
                    outcome,
                })
            );
        }

        let method = match object.remove("method") {
            Some(Value::String(method)) => method,
            Some(_) => {
                return Err(malformed(id, "method must be a string"));
            }
            None => {
                return Err(malformed(id, "message has neither method nor result"));
            }
        };
        let params = object.remove("params");

        Ok(match id {
            Some(id) =>
                Message::Request(Request {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    id,
                    method,
                    params,
                }),
            None =>
                Message::Notification(Notification {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    method,
                    params,
                }),
        })
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error> where D: Deserializer<'de> {
        let value = Value::deserialize(deserializer)?;
        Message::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

impl From<Notification> for Message {
    fn from(notification: Notification) -> Self {
        Message::Notification(notification)
    }
}

fn malformed(id: Option<RequestId>, reason: impl Into<String>) -> Error {
    Error::MalformedMessage {
        id,
        reason: reason.into(),
    }
}

/// Parse optional params into a typed value, treating a missing object as empty
pub fn parse_params<T>(params: Option<Value>) -> Result<T, Error> where T: serde::de::DeserializeOwned {
    let value = match params {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(value) => value,
    };
    serde_json::from_value(value).map_err(|e| Error::InvalidParams(e.to_string()))
}
