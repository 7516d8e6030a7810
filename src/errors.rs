//! Error Types
//!
//! This module defines the error type shared by the codec, transports, registry,
//! session engine and client, together with the mapping between errors and
//! JSON-RPC error payloads in both directions.

use std::fmt;

use serde::{ Deserialize, Serialize };
use serde_json::{ Value, json };
use thiserror::Error;

use crate::messages::{ ErrorData, RequestId };

/// The kind of registry item an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Tool,
    Resource,
    Prompt,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Tool => write!(f, "tool"),
            ItemKind::Resource => write!(f, "resource"),
            ItemKind::Prompt => write!(f, "prompt"),
        }
    }
}

/// A single argument that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the offending argument
    pub field: String,
    /// Why it was rejected
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

fn describe_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// The main Error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-related errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// A frame that is not a valid JSON-RPC 2.0 message
    #[error("Malformed message: {reason}")]
    MalformedMessage {
        /// Request id, when it could be recovered from the frame
        id: Option<RequestId>,
        reason: String,
    },

    /// Initialization could not be completed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// No protocol version both peers accept
    #[error("Incompatible protocol version: {0}")]
    IncompatibleVersion(String),

    /// Unknown tool, resource or prompt
    #[error("Unknown {kind}: {name}")]
    NotFound {
        kind: ItemKind,
        name: String,
    },

    /// A name registered twice in the same namespace
    #[error("Duplicate {kind} name: {name}")]
    DuplicateName {
        kind: ItemKind,
        name: String,
    },

    /// Arguments rejected by a parameter schema
    #[error("Invalid arguments: {}", describe_fields(.fields))]
    Validation {
        fields: Vec<FieldError>,
    },

    /// A tool handler reported a failure
    #[error("Tool error {code}: {message}")]
    RemoteTool {
        code: i64,
        message: String,
    },

    /// The session ended before the operation completed
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Request timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Method not found
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid parameters that are not tied to a declared schema
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Invalid state for requested operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Protocol errors (e.g., unexpected result shape)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An error response with a code this library does not map
    #[error("Remote error {code}: {message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    /// Other errors
    #[error("{0}")]
    Other(String),
}

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    /// Parse error
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// MCP-specific error codes are defined in the range below -32000
    pub const RESOURCE_NOT_FOUND: i32 = -33000;
    /// Tool not found
    pub const TOOL_NOT_FOUND: i32 = -33001;
    /// Tool execution error
    pub const TOOL_EXECUTION_ERROR: i32 = -33002;
    /// Prompt not found
    pub const PROMPT_NOT_FOUND: i32 = -33003;
    /// Server is not initialized
    pub const SERVER_NOT_INITIALIZED: i32 = -33005;
    /// Incompatible protocol version
    pub const INCOMPATIBLE_VERSION: i32 = -33007;
    /// Request timeout
    pub const REQUEST_TIMEOUT: i32 = -33011;
    /// Session is closing
    pub const SESSION_CLOSED: i32 = -33016;
}

impl Error {
    /// Convert an error to a JSON-RPC error code
    pub fn to_code(&self) -> i32 {
        use error_codes::*;
        match self {
            Error::Json(_) => PARSE_ERROR,
            Error::MalformedMessage { .. } => INVALID_REQUEST,
            Error::Protocol(_) => INVALID_REQUEST,
            Error::MethodNotFound(_) => METHOD_NOT_FOUND,
            Error::InvalidParams(_) => INVALID_PARAMS,
            Error::Validation { .. } => INVALID_PARAMS,
            Error::NotFound { kind: ItemKind::Tool, .. } => TOOL_NOT_FOUND,
            Error::NotFound { kind: ItemKind::Resource, .. } => RESOURCE_NOT_FOUND,
            Error::NotFound { kind: ItemKind::Prompt, .. } => PROMPT_NOT_FOUND,
            Error::RemoteTool { .. } => TOOL_EXECUTION_ERROR,
            Error::IncompatibleVersion(_) => INCOMPATIBLE_VERSION,
            Error::Handshake(_) => SERVER_NOT_INITIALIZED,
            Error::InvalidState(_) => SERVER_NOT_INITIALIZED,
            Error::Timeout(_) => REQUEST_TIMEOUT,
            Error::SessionClosed(_) => SESSION_CLOSED,
            Error::Rpc { code, .. } => *code,
            Error::DuplicateName { .. } => INTERNAL_ERROR,
            Error::Io(_) => INTERNAL_ERROR,
            Error::Transport(_) => INTERNAL_ERROR,
            Error::Other(_) => INTERNAL_ERROR,
        }
    }

    /// Build the error payload carried by a JSON-RPC error response
    pub fn to_error_data(&self) -> ErrorData {
        let data = match self {
            Error::NotFound { name, .. } => Some(json!({ "name": name })),
            Error::Validation { fields } => Some(json!({ "fields": fields })),
            Error::RemoteTool { code, .. } => Some(json!({ "code": code })),
            Error::Rpc { data, .. } => data.clone(),
            _ => None,
        };
        let message = match self {
            Error::RemoteTool { message, .. } => message.clone(),
            Error::Rpc { message, .. } => message.clone(),
            other => other.to_string(),
        };

        ErrorData {
            code: self.to_code(),
            message,
            data,
        }
    }

    /// Rebuild a typed error from a JSON-RPC error payload
    pub fn from_error_data(error: ErrorData) -> Self {
        use error_codes::*;

        let field = |key: &str| error.data.as_ref().and_then(|d| d.get(key)).cloned();
        let not_found = |kind: ItemKind| Error::NotFound {
            kind,
            name: field("name")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| error.message.clone()),
        };

        match error.code {
            TOOL_NOT_FOUND => not_found(ItemKind::Tool),
            RESOURCE_NOT_FOUND => not_found(ItemKind::Resource),
            PROMPT_NOT_FOUND => not_found(ItemKind::Prompt),
            INVALID_PARAMS => {
                match field("fields").and_then(|v| serde_json::from_value(v).ok()) {
                    Some(fields) => Error::Validation { fields },
                    None => Error::InvalidParams(error.message),
                }
            }
            TOOL_EXECUTION_ERROR =>
                Error::RemoteTool {
                    code: field("code")
                        .and_then(|v| v.as_i64())
                        .unwrap_or(TOOL_EXECUTION_ERROR as i64),
                    message: error.message,
                },
            INCOMPATIBLE_VERSION => Error::IncompatibleVersion(error.message),
            METHOD_NOT_FOUND => Error::MethodNotFound(error.message),
            SERVER_NOT_INITIALIZED => Error::InvalidState(error.message),
            REQUEST_TIMEOUT => Error::Timeout(error.message),
            SESSION_CLOSED => Error::SessionClosed(error.message),
            code =>
                Error::Rpc {
                    code,
                    message: error.message,
                    data: error.data,
                },
        }
    }

    /// Whether this error names an unknown tool, resource or prompt
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_survives_the_wire() {
        let original = Error::Validation {
            fields: vec![FieldError::new("text", "missing required argument")],
        };
        let data = original.to_error_data();
        assert_eq!(data.code, error_codes::INVALID_PARAMS);

        match Error::from_error_data(data) {
            Error::Validation { fields } => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "text");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_tool_failure_keeps_its_code() {
        let data = (Error::RemoteTool { code: 451, message: "blocked".into() }).to_error_data();
        assert_eq!(data.message, "blocked");

        match Error::from_error_data(data) {
            Error::RemoteTool { code, message } => {
                assert_eq!(code, 451);
                assert_eq!(message, "blocked");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_not_found_carries_name() {
        let data = (Error::NotFound { kind: ItemKind::Tool, name: "bogus".into() }).to_error_data();
        assert_eq!(data.code, error_codes::TOOL_NOT_FOUND);
        let error = Error::from_error_data(data);
        assert!(error.is_not_found());
        assert_eq!(error.to_string(), "Unknown tool: bogus");
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let error = Error::from_error_data(ErrorData {
            code: -32099,
            message: "custom".into(),
            data: None,
        });
        assert_eq!(error.to_code(), -32099);
    }
}
