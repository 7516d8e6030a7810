//! Tool Types
//!
//! This module defines the wire form of tools: the advertisement sent by
//! `tools/list`, the parameters of `tools/call`, and the result envelope that
//! carries either a handler's value or its failure.

use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };
use thiserror::Error;

use crate::errors::{ Error, error_codes };
use crate::messages::present;
use crate::registry::ParameterSchema;

/// A tool as advertised to clients
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Unique name of the tool
    pub name: String,
    /// Description of what the tool does
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool's arguments
    pub input_schema: Value,
}

impl Tool {
    /// Reconstruct the declared parameters from the advertised schema
    pub fn parameters(&self) -> ParameterSchema {
        ParameterSchema::from_json_schema(&self.input_schema)
    }
}

/// Result of listing tools
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    /// Tools in registration order
    pub tools: Vec<Tool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Parameters for calling a tool
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CallToolParams {
    /// Name of the tool to call
    pub name: String,
    /// Arguments to pass to the tool
    #[serde(default)]
    pub arguments: Option<Map<String, Value>>,
}

/// A piece of content in a tool result or prompt message
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Failure reported by a tool handler
#[derive(Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct ToolError {
    /// Error code, e.g. the HTTP status of a failed upstream call
    pub code: i64,
    /// Human-readable error message
    pub message: String,
}

impl ToolError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// A failure inside the handler itself rather than in anything it called
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR as i64, message)
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS as i64, message)
    }
}

impl From<ToolError> for Error {
    fn from(error: ToolError) -> Self {
        Error::RemoteTool {
            code: error.code,
            message: error.message,
        }
    }
}

/// Result of calling a tool
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content produced by the tool
    #[serde(default)]
    pub content: Vec<Content>,
    /// The handler's value when it is not plain text; an explicit `null` is kept
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    /// Whether the tool failed
    #[serde(default)]
    pub is_error: bool,
    /// Failure details when `is_error` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl CallToolResult {
    /// Wrap a handler's value; strings become plain text content
    pub fn success(value: Value) -> Self {
        match value {
            Value::String(text) =>
                Self {
                    content: vec![Content::text(text)],
                    structured_content: None,
                    is_error: false,
                    error: None,
                },
            other =>
                Self {
                    content: vec![Content::text(other.to_string())],
                    structured_content: Some(other),
                    is_error: false,
                    error: None,
                },
        }
    }

    pub fn failure(error: ToolError) -> Self {
        Self {
            content: vec![Content::text(error.message.clone())],
            structured_content: None,
            is_error: true,
            error: Some(error),
        }
    }

    /// Split into the handler's output or its failure
    pub fn into_output(self) -> Result<ToolOutput, Error> {
        if self.is_error {
            let error = self.error.unwrap_or_else(|| {
                let message = self.content
                    .iter()
                    .filter_map(Content::as_text)
                    .collect::<Vec<_>>()
                    .join("\n");
                ToolError::new(error_codes::TOOL_EXECUTION_ERROR as i64, message)
            });
            return Err(error.into());
        }

        Ok(ToolOutput {
            content: self.content,
            structured: self.structured_content,
        })
    }
}

/// Successful output of a tool call as seen by a client
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: Vec<Content>,
    pub structured: Option<Value>,
}

impl ToolOutput {
    /// All text content joined by newlines, if there is any
    pub fn text(&self) -> Option<String> {
        let parts: Vec<&str> = self.content.iter().filter_map(Content::as_text).collect();
        if parts.is_empty() { None } else { Some(parts.join("\n")) }
    }

    /// The handler's value: structured content when present, text otherwise
    pub fn value(&self) -> Value {
        match (&self.structured, self.text()) {
            (Some(value), _) => value.clone(),
            (None, Some(text)) => Value::String(text),
            (None, None) => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_result_is_plain_text() {
        let output = CallToolResult::success(json!("hi")).into_output().unwrap();
        assert_eq!(output.text().as_deref(), Some("hi"));
        assert_eq!(output.value(), json!("hi"));
        assert!(output.structured.is_none());
    }

    #[test]
    fn test_json_result_keeps_structure() {
        let ticker = json!({"symbol": "BTCUSDT", "priceChange": "12.5"});
        let output = CallToolResult::success(ticker.clone()).into_output().unwrap();
        assert_eq!(output.value(), ticker);
    }

    #[test]
    fn test_null_result_survives_the_wire() {
        let wire = serde_json::to_value(CallToolResult::success(Value::Null)).unwrap();
        assert_eq!(wire["structuredContent"], Value::Null);

        let parsed: CallToolResult = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed.structured_content, Some(Value::Null));
        assert_eq!(parsed.into_output().unwrap().value(), Value::Null);
    }

    #[test]
    fn test_failure_maps_to_remote_tool_error() {
        let result = CallToolResult::failure(ToolError::new(451, "unavailable"));
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(wire["isError"], json!(true));
        assert_eq!(wire["error"]["code"], json!(451));

        let parsed: CallToolResult = serde_json::from_value(wire).unwrap();
        match parsed.into_output() {
            Err(Error::RemoteTool { code, message }) => {
                assert_eq!(code, 451);
                assert_eq!(message, "unavailable");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
