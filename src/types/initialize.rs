//! Initialization Types
//!
//! This module defines the `initialize` exchange: the parameters a client
//! offers, the result a server answers with, and the rules for agreeing on a
//! protocol version and capability set.

use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };

use crate::errors::Error;

/// Newest protocol version this library speaks
pub const LATEST_PROTOCOL_VERSION: &str = "2025-03-26";

/// Every protocol version this library accepts, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05"];

/// Whether `version` is one this library can speak
pub fn is_supported_version(version: &str) -> bool {
    SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
}

fn looks_like_date(version: &str) -> bool {
    let bytes = version.as_bytes();
    bytes.len() == 10 &&
        bytes
            .iter()
            .enumerate()
            .all(|(i, b)| if i == 4 || i == 7 { *b == b'-' } else { b.is_ascii_digit() })
}

/// Pick the version to answer an `initialize` request with.
///
/// A supported version is echoed back. A newer, well-formed version is
/// answered with the latest version this library speaks and the client
/// decides whether to continue. Anything else has no version in common.
pub fn negotiate_version(requested: &str) -> Result<&'static str, Error> {
    if let Some(version) = SUPPORTED_PROTOCOL_VERSIONS.iter().find(|v| **v == requested) {
        return Ok(*version);
    }

    let oldest = SUPPORTED_PROTOCOL_VERSIONS.last().copied().unwrap_or(LATEST_PROTOCOL_VERSION);
    if looks_like_date(requested) && requested > oldest {
        return Ok(LATEST_PROTOCOL_VERSION);
    }

    Err(
        Error::IncompatibleVersion(
            format!(
                "requested {}, supported versions are {}",
                requested,
                SUPPORTED_PROTOCOL_VERSIONS.join(", ")
            )
        )
    )
}

/// Parameters for the initialize request
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequestParams {
    /// The version of the protocol the client prefers, e.g. "2025-03-26"
    pub protocol_version: String,
    /// Client capabilities for feature negotiation
    #[serde(default)]
    pub capabilities: ClientCapabilities,
    /// Information about the client implementation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<Implementation>,
}

/// Result of the initialize request
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// The negotiated protocol version
    pub protocol_version: String,
    /// Server capabilities for feature negotiation
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    /// Information about the server implementation
    pub server_info: Implementation,
    /// Optional instructions for the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Information about an implementation (client or server)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Implementation {
    /// Name of the implementation
    pub name: String,
    /// Version of the implementation
    #[serde(default)]
    pub version: String,
}

impl Implementation {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Client capabilities
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ClientCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Value>,
    /// Experimental capabilities, keyed by feature name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Map<String, Value>>,
}

/// Server capabilities
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Map<String, Value>>,
}

impl ServerCapabilities {
    /// Restrict experimental features to those the client also advertised
    pub fn negotiate(mut self, client: &ClientCapabilities) -> Self {
        self.experimental = match (self.experimental.take(), client.experimental.as_ref()) {
            (Some(ours), Some(theirs)) => {
                let shared: Map<String, Value> = ours
                    .into_iter()
                    .filter(|(key, _)| theirs.contains_key(key))
                    .collect();
                if shared.is_empty() { None } else { Some(shared) }
            }
            _ => None,
        };
        self
    }
}

/// Tool capabilities
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// Support for list changes
    #[serde(default)]
    pub list_changed: bool,
}

/// Resource capabilities
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {
    /// Support for resource subscription
    #[serde(default)]
    pub subscribe: bool,
    /// Support for list changes
    #[serde(default)]
    pub list_changed: bool,
}

/// Prompt capabilities
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptsCapability {
    /// Support for list changes
    #[serde(default)]
    pub list_changed: bool,
}
